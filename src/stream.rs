// =============================================================================
// Stream Client — ingress WebSocket for token creations and trades
// =============================================================================
//
// Connects to the stream source, subscribes to new-token events, and manages
// per-mint trade subscriptions on behalf of the coordinator. Runs until the
// connection drops or errors, then returns so the caller (main.rs) can
// reconnect; the subscribed-mints set lives with the caller and is replayed
// on every reconnect.
//
// Trades and creates are forwarded with `send().await` — backpressure slows
// the reader down, but stream events are never dropped. Malformed messages
// are logged and skipped without state change.
// =============================================================================

use std::collections::HashSet;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::types::{IngressEvent, StreamEvent};

/// Subscription management commands from the coordinator.
#[derive(Debug, Clone)]
pub enum StreamCommand {
    SubscribeTokenTrades(Vec<String>),
    UnsubscribeTokenTrades(Vec<String>),
}

// ---------------------------------------------------------------------------
// Control frames
// ---------------------------------------------------------------------------

fn subscribe_new_token_frame() -> String {
    json!({ "method": "subscribeNewToken" }).to_string()
}

fn subscribe_trades_frame(keys: &[String]) -> String {
    json!({ "method": "subscribeTokenTrade", "keys": keys }).to_string()
}

fn unsubscribe_trades_frame(keys: &[String]) -> String {
    json!({ "method": "unsubscribeTokenTrade", "keys": keys }).to_string()
}

/// Parse one text frame into a stream event.
fn parse_stream_message(text: &str) -> Result<StreamEvent> {
    serde_json::from_str(text).context("unrecognised stream message")
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

/// Connect and pump the stream until it ends or errors.
///
/// * `events` — coordinator ingress channel; creates and trades are never
///   dropped.
/// * `commands` — subscription commands from the coordinator.
/// * `subscribed` — mints with an active trade subscription; mutated here,
///   owned by the caller so reconnects can replay it.
pub async fn run_stream(
    url: &str,
    events: mpsc::Sender<IngressEvent>,
    commands: &mut mpsc::UnboundedReceiver<StreamCommand>,
    subscribed: &mut HashSet<String>,
) -> Result<()> {
    info!(url = %url, "connecting to stream source");
    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to stream source")?;
    info!("stream source connected");

    let (mut write, mut read) = ws_stream.split();

    // New-token firehose plus any trade subscriptions that survived a
    // reconnect.
    write
        .send(Message::Text(subscribe_new_token_frame()))
        .await
        .context("failed to subscribe to new tokens")?;
    if !subscribed.is_empty() {
        let keys: Vec<String> = subscribed.iter().cloned().collect();
        info!(count = keys.len(), "replaying trade subscriptions");
        write
            .send(Message::Text(subscribe_trades_frame(&keys)))
            .await
            .context("failed to replay trade subscriptions")?;
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("command channel closed — stream client exiting");
                    return Ok(());
                };
                match command {
                    StreamCommand::SubscribeTokenTrades(keys) => {
                        // Idempotent: only previously unknown mints go out.
                        let fresh: Vec<String> = keys
                            .into_iter()
                            .filter(|k| subscribed.insert(k.clone()))
                            .collect();
                        if !fresh.is_empty() {
                            debug!(keys = ?fresh, "subscribing token trades");
                            write
                                .send(Message::Text(subscribe_trades_frame(&fresh)))
                                .await
                                .context("failed to send trade subscription")?;
                        }
                    }
                    StreamCommand::UnsubscribeTokenTrades(keys) => {
                        let known: Vec<String> = keys
                            .into_iter()
                            .filter(|k| subscribed.remove(k))
                            .collect();
                        if !known.is_empty() {
                            debug!(keys = ?known, "unsubscribing token trades");
                            write
                                .send(Message::Text(unsubscribe_trades_frame(&known)))
                                .await
                                .context("failed to send trade unsubscription")?;
                        }
                    }
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match parse_stream_message(&text) {
                            Ok(event) => {
                                if events
                                    .send(IngressEvent::Stream(event))
                                    .await
                                    .is_err()
                                {
                                    info!("ingress channel closed — stream client exiting");
                                    return Ok(());
                                }
                            }
                            Err(e) => {
                                // Validation failure: drop the event, no state
                                // change.
                                warn!(error = %e, "dropping malformed stream message");
                            }
                        }
                    }
                    Some(Ok(_)) => {
                        // Ping/pong/binary frames: tungstenite answers pings
                        // itself.
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "stream read error");
                        return Err(e.into());
                    }
                    None => {
                        warn!("stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}
