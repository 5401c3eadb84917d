//! Image upload: one connection per file.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::TcpStream;

use chroma_core::wire::{self, FrameHeader, DEFAULT_CHUNK_SIZE};

use super::Server;

/// What the daemon answered for one upload.
pub struct Sent {
    pub name: String,
    pub bytes: u64,
    pub response: String,
}

/// Upload `path` under its base name and wait for the status line.
pub async fn send_file(server: &Server, path: &str) -> Result<Sent> {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no file name in {path}"))?
        .to_string();

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open file: {path}"))?;
    let size = file
        .metadata()
        .await
        .with_context(|| format!("failed to stat file: {path}"))?
        .len();

    let mut stream = TcpStream::connect(server.addr())
        .await
        .with_context(|| format!("failed to connect to chromad at {} — is it running?", server.addr()))?;

    let header = FrameHeader::new(name.as_bytes().to_vec(), size);
    let mut body = tokio::io::BufReader::new(file);
    let bytes = wire::write_request(&mut stream, &header, &mut body, DEFAULT_CHUNK_SIZE)
        .await
        .with_context(|| format!("failed to upload {name}"))?;

    let response = wire::read_response(&mut stream)
        .await
        .context("failed to read server response")?;

    Ok(Sent {
        name,
        bytes,
        response,
    })
}

pub async fn cmd_send(server: &Server, paths: &[&str]) -> Result<()> {
    let mut failed = 0usize;
    for path in paths {
        match send_file(server, path).await {
            Ok(sent) => print_sent(&sent),
            Err(e) => {
                eprintln!("✗ {path}: {e:#}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} uploads failed", paths.len());
    }
    Ok(())
}

pub fn print_sent(sent: &Sent) {
    println!("→ Sent {} ({} bytes)", sent.name, sent.bytes);
    if sent.response.is_empty() {
        println!("← Connection closed without a response");
    } else {
        print!("← {}", sent.response);
        if !sent.response.ends_with('\n') {
            println!();
        }
    }
}
