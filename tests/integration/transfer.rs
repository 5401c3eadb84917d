use crate::*;

/// A red 2×2 PNG is classified red and equalized to all-white.
#[tokio::test]
async fn test_red_photo_end_to_end() {
    let server = TestServer::start("e2e-red").await;

    let response = server
        .upload("photo.png", &png(2, 2, [200, 50, 10]))
        .await
        .unwrap();

    let equalized = server.storage.equalized_dir.join("photo_equalized.png");
    assert_eq!(
        response,
        format!(
            "OK: Imagen clasificada y ecualizada exitosamente\nEcualizada: {}\n",
            equalized.display()
        )
    );
    assert!(server.storage.red_dir.join("photo.png").exists());
    assert!(!server.storage.incoming_dir.join("photo.png").exists());
    assert_eq!(gray_samples(&equalized), vec![255; 4]);

    let audit = server.audit_lines();
    assert_eq!(audit.len(), 1);
    assert!(
        audit[0].ends_with("client=127.0.0.1 file=photo.png status=BOTH OK"),
        "audit line: {}",
        audit[0]
    );
}

/// Uploaded bytes arrive in the label area unchanged.
#[tokio::test]
async fn test_relocated_file_matches_upload() {
    let server = TestServer::start("e2e-bytes").await;
    let body = png(40, 30, [5, 10, 250]);

    server.upload("ocean.png", &body).await.unwrap();

    let stored = std::fs::read(server.storage.blue_dir.join("ocean.png")).unwrap();
    assert_eq!(stored, body);
}

/// An upload spanning many chunks is received intact.
#[tokio::test]
async fn test_multi_chunk_upload() {
    let server = TestServer::start("e2e-large").await;
    let noise: Vec<u8> = (0..512u32 * 512 * 3)
        .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
        .collect();
    let img = image::RgbImage::from_raw(512, 512, noise).unwrap();
    let body = encode(image::DynamicImage::ImageRgb8(img), image::ImageFormat::Png);
    assert!(body.len() > 64 * 1024);

    let response = server.upload("noise.png", &body).await.unwrap();
    assert!(response.starts_with("OK: "), "response: {response}");

    let storage = &server.storage;
    let stored = [&storage.red_dir, &storage.green_dir, &storage.blue_dir]
        .iter()
        .map(|area| area.join("noise.png"))
        .find(|p| p.exists())
        .expect("upload in some label area");
    assert_eq!(std::fs::read(stored).unwrap(), body);
}

/// Client-supplied directories never leave the storage areas.
#[tokio::test]
async fn test_path_components_are_stripped() {
    let server = TestServer::start("e2e-traversal").await;

    let response = server
        .upload("../../../tmp/evil.png", &png(1, 1, [0, 255, 0]))
        .await
        .unwrap();

    assert!(response.starts_with("OK: "), "response: {response}");
    assert!(server.storage.green_dir.join("evil.png").exists());
    assert!(server.storage.equalized_dir.join("evil_equalized.png").exists());
}

/// A name past the filesystem limit is shortened, not failed.
#[tokio::test]
async fn test_overlong_name_is_shortened() {
    let server = TestServer::start("e2e-longname").await;
    let long = format!("{}.png", "a".repeat(296));

    let response = server.upload(&long, &png(64, 64, [230, 20, 20])).await.unwrap();

    let stored = format!("{}.png", "a".repeat(241));
    let equalized = server
        .storage
        .equalized_dir
        .join(format!("{}_equalized.png", "a".repeat(241)));
    assert_eq!(
        response,
        format!(
            "OK: Imagen clasificada y ecualizada exitosamente\nEcualizada: {}\n",
            equalized.display()
        )
    );
    assert!(server.storage.red_dir.join(&stored).exists());
    assert!(equalized.exists());
    assert!(server.audit_lines()[0].ends_with(&format!("file={stored} status=BOTH OK")));
}

/// Several clients at once each get their own result and audit line.
#[tokio::test]
async fn test_concurrent_clients() {
    let server = std::sync::Arc::new(TestServer::start("e2e-concurrent").await);
    let colors = [[220, 10, 10], [10, 220, 10], [10, 10, 220]];

    let mut tasks = Vec::new();
    for i in 0..9 {
        let server = server.clone();
        let rgb = colors[i % 3];
        tasks.push(tokio::spawn(async move {
            let name = format!("img{i}.png");
            let response = server.upload(&name, &png(8, 8, rgb)).await.unwrap();
            (name, response)
        }));
    }
    for t in tasks {
        let (name, response) = t.await.unwrap();
        assert!(response.starts_with("OK: "), "{name}: {response}");
    }

    for i in 0..9 {
        let area = match i % 3 {
            0 => &server.storage.red_dir,
            1 => &server.storage.green_dir,
            _ => &server.storage.blue_dir,
        };
        assert!(area.join(format!("img{i}.png")).exists(), "img{i}.png");
    }

    let audit = server.audit_lines();
    assert_eq!(audit.len(), 9);
    assert!(audit.iter().all(|l| l.ends_with("status=BOTH OK")));
}
