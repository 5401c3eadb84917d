//! Prompt loop: one file name per line, `exit` to quit.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::send::{print_sent, send_file};
use super::Server;

pub async fn cmd_interactive(server: &Server) -> Result<()> {
    println!("═══════════════════════════════════════");
    println!("  Chroma client — {}", server.addr());
    println!("═══════════════════════════════════════");
    println!("  Enter an image path per line, 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut count = 0usize;

    loop {
        stdout.write_all(b"image> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        if path.eq_ignore_ascii_case("exit") {
            break;
        }

        count += 1;
        println!("\n#{count}: {path}");
        match send_file(server, path).await {
            Ok(sent) => print_sent(&sent),
            Err(e) => println!("✗ {e:#}"),
        }
        println!();
    }

    println!("Images sent: {count}");
    Ok(())
}
