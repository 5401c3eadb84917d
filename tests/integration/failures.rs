use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::*;

/// Whatever the server sent before closing. A reset counts as nothing.
async fn drain(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    buf
}

/// Client closes after S-1 of S payload bytes.
#[tokio::test]
async fn test_truncated_transfer() {
    let server = TestServer::start("fail-truncated").await;
    let mut stream = server.connect().await;

    stream.write_all(&7u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"cut.png").await.unwrap();
    stream.write_all(&100i64.to_be_bytes()).await.unwrap();
    stream.write_all(&[0xAB; 99]).await.unwrap();
    stream.shutdown().await.unwrap();

    let response = drain(&mut stream).await;
    assert_eq!(String::from_utf8_lossy(&response), "ERROR: Transfer incompleto\n");

    assert!(!server.storage.incoming_dir.join("cut.png").exists());
    let audit = server.audit_lines();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].ends_with("file=cut.png status=TRANSFER ERROR"));
}

/// A peer that stops sending mid-payload is timed out.
#[tokio::test]
async fn test_stalled_payload_times_out() {
    let server = TestServer::start_with_timeouts(
        "fail-stall",
        Duration::from_millis(300),
        Duration::from_secs(30),
    )
    .await;
    let mut stream = server.connect().await;

    stream.write_all(&8u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"slow.png").await.unwrap();
    stream.write_all(&1000i64.to_be_bytes()).await.unwrap();
    stream.write_all(&[1; 10]).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), drain(&mut stream))
        .await
        .expect("server should give up on the stalled peer");
    assert_eq!(String::from_utf8_lossy(&response), "ERROR: Transfer incompleto\n");
    assert!(!server.storage.incoming_dir.join("slow.png").exists());
    assert!(server.audit_lines()[0].ends_with("status=TRANSFER ERROR"));
}

/// A peer that keeps each read just under the idle timeout still hits the
/// payload deadline.
#[tokio::test]
async fn test_trickled_payload_hits_deadline() {
    let server = TestServer::start_with_timeouts(
        "fail-trickle",
        Duration::from_millis(300),
        Duration::from_secs(1),
    )
    .await;
    let stream = server.connect().await;
    let (mut rd, mut wr) = stream.into_split();

    wr.write_all(&8u32.to_be_bytes()).await.unwrap();
    wr.write_all(b"drip.png").await.unwrap();
    wr.write_all(&1_000_000i64.to_be_bytes()).await.unwrap();

    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let trickle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if wr.write_all(&[0x42]).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut response = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), rd.read_to_end(&mut response)).await;
    let _ = stop_tx.send(());
    let _ = trickle.await;

    assert!(read.is_ok(), "session outlived the payload deadline");
    assert_eq!(String::from_utf8_lossy(&response), "ERROR: Transfer incompleto\n");
    assert!(!server.storage.incoming_dir.join("drip.png").exists());
    let audit = server.audit_lines();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].ends_with("file=drip.png status=TRANSFER ERROR"));
}

/// Name lengths outside 1..=1024 close the connection with no response.
#[tokio::test]
async fn test_invalid_name_length() {
    let server = TestServer::start("fail-namelen").await;

    for len in [0u32, 1025, u32::MAX] {
        let mut stream = server.connect().await;
        stream.write_all(&len.to_be_bytes()).await.unwrap();
        assert!(drain(&mut stream).await.is_empty(), "name_len {len}");
    }

    assert!(server.audit_lines().is_empty());
}

/// A negative declared size is rejected before any payload is read.
#[tokio::test]
async fn test_negative_size() {
    let server = TestServer::start("fail-negsize").await;
    let mut stream = server.connect().await;

    stream.write_all(&5u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"a.png").await.unwrap();
    stream.write_all(&(-1i64).to_be_bytes()).await.unwrap();

    assert!(drain(&mut stream).await.is_empty());
    assert!(server.audit_lines().is_empty());
    assert!(!server.storage.incoming_dir.join("a.png").exists());
}

/// Closing partway through the header is a silent abort.
#[tokio::test]
async fn test_incomplete_header() {
    let server = TestServer::start("fail-header").await;
    let mut stream = server.connect().await;

    stream.write_all(&10u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"abc").await.unwrap();
    stream.shutdown().await.unwrap();

    assert!(drain(&mut stream).await.is_empty());
    assert!(server.audit_lines().is_empty());
}

/// A name that is only directories has nothing to store under.
#[tokio::test]
async fn test_unusable_name() {
    let server = TestServer::start("fail-name").await;
    let mut stream = server.connect().await;

    stream.write_all(&3u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"../").await.unwrap();
    stream.write_all(&4i64.to_be_bytes()).await.unwrap();
    stream.write_all(b"data").await.unwrap();

    assert!(drain(&mut stream).await.is_empty());
    assert!(server.audit_lines().is_empty());
}

/// A bad session does not take the listener down.
#[tokio::test]
async fn test_server_survives_failures() {
    let server = TestServer::start("fail-survive").await;

    let mut bad = server.connect().await;
    bad.write_all(&0u32.to_be_bytes()).await.unwrap();
    drain(&mut bad).await;

    let response = server.upload("after.png", &png(2, 2, [0, 0, 200])).await.unwrap();
    assert!(response.starts_with("OK: "), "response: {response}");
}
