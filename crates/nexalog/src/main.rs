mod commands;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use nexalog_core::{config::Config, notify::ToastKind, panel::ControlPanel};
use nexalog_http::HttpRemote;

use commands::{execute, parse_command, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nexalog_core::logging::init("nexalog")?;

    let cfg = Arc::new(Config::load().context("loading configuration")?);
    let remote = Arc::new(HttpRemote::new(cfg.api_base_url.clone())?);
    info!(api = %cfg.api_base_url, "control panel starting");

    let panel = ControlPanel::new(cfg, remote);
    let poll = panel.start_polling();

    // Toasts go to stderr so they don't interleave with command output.
    let mut toasts = panel.notifier().subscribe();
    let toast_printer = tokio::spawn(async move {
        while toasts.changed().await.is_ok() {
            let toast = toasts.borrow_and_update().clone();
            if let Some(t) = toast {
                let tag = match t.kind {
                    ToastKind::Success => "ok",
                    ToastKind::Error => "error",
                };
                eprintln!("[{tag}] {}", t.message);
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(b"nexalog ready, type `help`\n> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let reply = match parse_command(&line) {
            Ok(None) => String::new(),
            Ok(Some(Command::Quit)) => break,
            Ok(Some(cmd)) => match execute(&panel, cmd).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("command failed: {e}");
                    format!("error: {e}")
                }
            },
            Err(e) => format!("error: {e}"),
        };
        if !reply.is_empty() {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    poll.shutdown().await;
    toast_printer.abort();
    info!("control panel stopped");
    Ok(())
}
