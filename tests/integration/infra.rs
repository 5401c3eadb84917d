//! Shared test infrastructure.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use chroma_core::config::StorageConfig;
use chroma_core::wire::{self, FrameHeader, FrameLimits, DEFAULT_CHUNK_SIZE};
use chroma_services::{serve, SessionContext};

/// A running accept loop bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub storage: StorageConfig,
    root: PathBuf,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    pub async fn start(tag: &str) -> Self {
        Self::start_with_timeouts(tag, Duration::from_secs(5), Duration::from_secs(30)).await
    }

    /// `read_timeout` bounds each read; `payload_timeout` the whole payload.
    pub async fn start_with_timeouts(
        tag: &str,
        read_timeout: Duration,
        payload_timeout: Duration,
    ) -> Self {
        let root = std::env::temp_dir().join(format!("chroma-it-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let storage = StorageConfig::under(&root);
        storage.ensure_dirs().expect("storage dirs");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let limits = FrameLimits {
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout,
            payload_timeout,
        };
        let ctx = Arc::new(SessionContext::new(storage.clone(), limits));

        let (shutdown, rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, ctx, rx));

        Self {
            addr,
            storage,
            root,
            shutdown,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.expect("connect")
    }

    /// Upload `body` under `name` and return the response text.
    pub async fn upload(&self, name: &str, body: &[u8]) -> Result<String> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .context("connect")?;
        let header = FrameHeader::new(name.as_bytes().to_vec(), body.len() as u64);
        let mut cursor = body;
        wire::write_request(&mut stream, &header, &mut cursor, DEFAULT_CHUNK_SIZE)
            .await
            .context("write request")?;
        wire::read_response(&mut stream)
            .await
            .context("read response")
    }

    pub fn audit_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.storage.audit_log)
            .map(|t| t.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// A `width`×`height` PNG filled with one color.
pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    encode(image::DynamicImage::ImageRgb8(img), image::ImageFormat::Png)
}

pub fn encode(img: image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

/// Gray samples of an image file on disk.
pub fn gray_samples(path: &std::path::Path) -> Vec<u8> {
    image::open(path)
        .unwrap_or_else(|e| panic!("open {}: {e}", path.display()))
        .into_luma8()
        .into_raw()
}
