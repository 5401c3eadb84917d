//! chroma-ctl — command-line client for the chroma daemon.

use anyhow::{Context, Result};

use chroma_core::wire::DEFAULT_PORT;

mod cmd;

use cmd::Server;

const DEFAULT_HOST: &str = "127.0.0.1";

fn print_usage() {
    println!("Usage: chroma-ctl [--host <ip>] [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  send <file>...   Upload images and print each response");
    println!("  interactive      Prompt for image paths until 'exit'");
    println!();
    println!("Options:");
    println!("  --host <ip>      Daemon address (default: {})", DEFAULT_HOST);
    println!("  --port <port>    Daemon port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut server = Server {
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
    };
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                server.port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--host" => {
                i += 1;
                server.host = args.get(i).context("--host requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["send", files @ ..] if !files.is_empty() => cmd::send::cmd_send(&server, files).await,
        ["interactive"] | [] => cmd::interactive::cmd_interactive(&server).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
