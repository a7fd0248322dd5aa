// src/main.rs
use anyhow::Context;
use dotenvy::dotenv;
use position_follower::config::AppConfig;
use position_follower::connectors::{BybitGateway, ExchangeGateway, SignedRequestClient};
use position_follower::core::{ChannelNotifier, Dispatcher, Notifier};
use position_follower::storage::{JsonlLedger, OrderLedger};
use position_follower::strategies::StopLossLadder;
use position_follower::types::{ChannelId, Notification};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "follower.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::load()?;
    let _log_guard = init_tracing(&config.log_dir);

    println!("========================================");
    println!("     POSITIONS FOLLOWER - v0.1.1");
    println!("========================================");
    println!("Exchange: {}", config.exchange.base_url);
    println!("Settle:   {}", config.follower.settle_coin);

    // 2. Initialize Components
    let jsonl = JsonlLedger::open(&config.ledger_path)
        .await
        .with_context(|| format!("cannot open ledger {}", config.ledger_path))?;
    let recorded = jsonl
        .read_all()
        .await
        .with_context(|| format!("ledger {} is corrupt", config.ledger_path))?;
    info!(orders = recorded.len(), "order ledger loaded");
    println!("Ledger:   {} ({} orders)", config.ledger_path, recorded.len());
    println!("========================================");
    let ledger: Arc<dyn OrderLedger> = Arc::new(jsonl);
    let client = SignedRequestClient::new(&config.exchange)?;
    let gateway: Arc<dyn ExchangeGateway> =
        Arc::new(BybitGateway::new(client, ledger, config.follower.category));
    let ladder = Arc::new(StopLossLadder::from_config(&config.ladder)?);

    // 3. Create Channels
    let (notify_tx, mut notify_rx) = mpsc::channel::<Notification>(256);
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(notify_tx));

    tokio::spawn(async move {
        while let Some(n) = notify_rx.recv().await {
            println!("[{}] {}", n.channel, n.text);
        }
    });

    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(gateway, notifier, ladder, &config.follower, shutdown);
    let console = ChannelId::new("console");
    println!("{}", dispatcher.help());

    // 4. Command loop until stdin closes or Ctrl+C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, stopping monitors");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let reply = dispatcher.handle(&line, &console).await;
                    println!("{reply}");
                }
                Ok(None) => {
                    info!("stdin closed, following until Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Err(e) => {
                    error!("stdin error: {}", e);
                    break;
                }
            }
        }
    }

    dispatcher.shutdown().await;
    info!("follower stopped");
    Ok(())
}
