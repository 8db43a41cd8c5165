use anyhow::Context;
use callroom_lib::logger::init_logging;
use callroom_lib::{CallView, ChatHandle, ClientConfig, TrackSource, VideoChat};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Two-party video chat over STOMP signaling
#[derive(Debug, Parser)]
#[command(name = "callroom", version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "CALLROOM_CONFIG")]
    config: Option<PathBuf>,

    /// Signaling WebSocket URL (overrides the config file)
    #[arg(long, env = "CALLROOM_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Deny camera/microphone access
    #[arg(long)]
    no_media: bool,

    /// Start a call right after connecting
    #[arg(long)]
    call: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.signaling_url {
        config.signaling_url = url;
    }
    if cli.no_media {
        config.media.granted = false;
    }
    config.validate()?;
    init_logging(&config.log_filter);

    let media = Arc::new(TrackSource::new(config.media.granted));
    let mut chat = VideoChat::connect(&config, media)
        .await
        .context("connecting to signaling server")?;

    let handle = chat.handle();
    if cli.call {
        if let Err(e) = handle.start_call().await {
            warn!("Call not started: {e}");
        }
    }

    let input = tokio::spawn(read_commands(handle));
    println!("Type a message and press enter. /call starts the video call, /quit exits.");

    let mut view = CallView::new();
    loop {
        tokio::select! {
            event = chat.next_event() => match event {
                Some(event) => {
                    view.apply(&event);
                    print!("{view}");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    input.abort();
    chat.shutdown().await?;
    Ok(())
}

async fn read_commands(handle: ChatHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let result = match line {
            "" => continue,
            "/quit" => {
                let _ = handle.teardown().await;
                return;
            }
            "/call" => handle.start_call().await,
            text => handle.send_message(text).await,
        };
        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }
}
