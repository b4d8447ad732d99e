use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use album_relay::{
    AlbumBuffer, AlbumBufferConfig, AlbumDelivery, ChannelDelivery, Envelope, RelayConfig,
    SessionContext, WebhookDelivery,
};

/// Reads message envelopes as JSON lines from stdin and forwards them,
/// grouping album media into single deliveries
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory for application logs
    #[clap(long, value_name = "PATH", default_value = "./logs")]
    logs_dir: PathBuf,

    /// Seconds an album may stay idle before it is delivered
    #[clap(long, value_name = "SECONDS")]
    wait_seconds: Option<u64>,

    /// Deliver every message on its own, without album grouping
    #[clap(long)]
    disabled: bool,

    /// Webhook that receives the payloads
    #[clap(long, value_name = "URL")]
    webhook_url: Option<String>,

    /// Print payloads to stdout instead of posting them
    #[clap(long)]
    dry_run: bool,

    /// User id sent along with every delivery
    #[clap(long, default_value = "")]
    user_id: String,

    /// Token sent along with every delivery
    #[clap(long, default_value = "")]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut buffer_config = AlbumBufferConfig::from_env()?;
    if let Some(seconds) = args.wait_seconds {
        buffer_config.wait = Duration::from_secs(seconds);
    }
    if args.disabled {
        buffer_config.enabled = false;
    }

    let config =
        RelayConfig::new(&args.logs_dir, buffer_config).with_webhook_url(args.webhook_url.clone());
    album_relay::init_tracing(&config.logs_dir)?;

    tracing::debug!(target: "album_relay::main", "Starting with {:?}", config);

    let session = SessionContext {
        user_id: args.user_id.clone(),
        token: args.token.clone(),
        webhook_url: None,
    };

    let mut printer = None;
    let delivery: Arc<dyn AlbumDelivery> = if args.dry_run {
        let (delivery, mut rx) = ChannelDelivery::new();
        printer = Some(tokio::spawn(async move {
            while let Some(delivered) = rx.recv().await {
                println!("{}", Value::Object(delivered.payload));
            }
        }));
        Arc::new(delivery)
    } else {
        Arc::new(WebhookDelivery::new(config.webhook_url.clone())?)
    };

    let buffer = AlbumBuffer::init(config.buffer.clone(), delivery.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(target: "album_relay::main", "Skipping malformed envelope: {}", e);
                continue;
            }
        };

        album_relay::route(&buffer, delivery.as_ref(), &session, envelope).await?;
    }

    tracing::info!(
        target: "album_relay::main",
        "Input closed, waiting for {} pending albums",
        buffer.pending_count()
    );
    buffer.drain().await;
    buffer.shutdown();

    // Closing every delivery handle ends the printer.
    drop(buffer);
    drop(delivery);
    if let Some(printer) = printer {
        printer.await.context("Printer task failed")?;
    }

    album_relay::flush_tracing();
    Ok(())
}
