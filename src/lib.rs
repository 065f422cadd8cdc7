pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod overlay;
pub mod peer;
pub mod signaling;
pub mod utils;

pub use client::{Client, UiCommand};
pub use config::{Args, ClientConfig};
pub use error::{ClientError, ClientResult, ProtocolError};
pub use logger::{UiEvent, UiNotifier};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Разбор строки stdin: `start`, `stop`, `resize W H`, `quit`
pub fn parse_command(line: &str) -> Option<UiCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "start" => UiCommand::Start,
        "stop" => UiCommand::Stop,
        "quit" | "exit" => UiCommand::Shutdown,
        "resize" => {
            let width = words.next()?.parse().ok()?;
            let height = words.next()?.parse().ok()?;
            UiCommand::Resize { width, height }
        }
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}

/// Точка входа бинарника: команды со stdin, UI события JSON строками в stdout
pub async fn run(args: Args) -> ClientResult<()> {
    logger::init(&args.log_level);
    let config = ClientConfig::try_from(args)?;
    info!("Signaling endpoint {}", config.signaling_url);

    let (ui, mut ui_rx) = UiNotifier::new();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Cannot serialize UI event: {}", e),
            }
        }
    });

    let stdin_tx = commands_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if stdin_tx.send(command).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command: {}", line.trim()),
            }
        }
        // stdin закрыт: работаем дальше до quit или Ctrl+C
    });

    let ctrl_c_tx = commands_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            let _ = ctrl_c_tx.send(UiCommand::Shutdown);
        }
    });

    if config.autostart {
        let _ = commands_tx.send(UiCommand::Start);
    }
    drop(commands_tx);

    let mut client = Client::from_config(&config, ui).await;
    client.run(commands_rx).await;
    Ok(())
}
