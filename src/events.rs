// =============================================================================
// Engine Event Bus — single typed fan-out channel per coordinator
// =============================================================================
//
// Every cross-component notification flows through one broadcast channel.
// Collaborators (dashboard, log writers) subscribe; the core never blocks on
// them. Publishing with zero subscribers is a no-op, and a slow subscriber
// only lags its own receiver.
// =============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::token::lifecycle::TokenState;

/// Capacity of the broadcast ring. Lagging subscribers skip, the core never
/// waits.
const BUS_CAPACITY: usize = 1024;

/// Direction of an indicator cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossDirection {
    Up,
    Down,
}

/// Which indicator pair crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossKind {
    EmaFastSlow { fast: usize, slow: usize },
    PriceVwap { period: usize },
}

/// An indicator cross observed on a freshly closed candle.
#[derive(Debug, Clone, Serialize)]
pub struct CrossEvent {
    pub mint: String,
    pub kind: CrossKind,
    pub direction: CrossDirection,
    pub timeframe: String,
    pub timestamp: i64,
    pub price: f64,
    /// Value of the slower side at the cross (slow EMA or VWAP).
    pub cross_value: f64,
}

/// Snapshot of a closed or partially exited position, as carried on events.
#[derive(Debug, Clone, Serialize)]
pub struct PositionEventPayload {
    pub position_id: String,
    pub mint: String,
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub remaining_fraction: f64,
    pub unrealized_pnl_sol: f64,
    pub realized_pnl_sol: f64,
}

/// Everything the engine tells the outside world.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    NewToken {
        mint: String,
        symbol: String,
        name: String,
    },
    TokenAdded {
        mint: String,
    },
    TokenRemoved {
        mint: String,
        reason: String,
    },
    TokenUpdated {
        mint: String,
        price_sol: f64,
        market_cap_usd: f64,
    },
    StateChanged {
        mint: String,
        from: TokenState,
        to: TokenState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TokenUnsafe {
        mint: String,
        reasons: Vec<String>,
    },
    TokenDead {
        mint: String,
        reason: String,
    },
    PositionOpened {
        position: PositionEventPayload,
    },
    PositionUpdated {
        position: PositionEventPayload,
    },
    PositionClosed {
        position: PositionEventPayload,
        reason: String,
    },
    PartialExit {
        position: PositionEventPayload,
        fraction: f64,
        reason: String,
    },
    RecoveryOpportunity {
        mint: String,
        drawdown_depth_pct: f64,
        recovery_strength: f64,
        accumulation_score: f64,
        buy_pressure: f64,
    },
    RecoveryWarning {
        mint: String,
        recovery_strength: f64,
    },
    RecoveryStrength {
        mint: String,
        recovery_strength: f64,
    },
    Cross(CrossEvent),
    MissedOpportunityRecorded {
        mint: String,
        potential_profit_pct: Option<f64>,
    },
}

/// The coordinator's single typed event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe a new collaborator. Each receiver sees every event published
    /// after this call, minus anything it lags past the ring capacity.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Never blocks; with no subscribers this is a no-op.
    pub fn publish(&self, event: EngineEvent) {
        if let Err(e) = self.tx.send(event) {
            // Only fails when there are no receivers.
            debug!(event = ?e.0, "event published with no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::TokenAdded { mint: "m1".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::NewToken {
            mint: "m1".into(),
            symbol: "TST".into(),
            name: "Test".into(),
        });
        bus.publish(EngineEvent::TokenAdded { mint: "m1".into() });

        match rx.recv().await.unwrap() {
            EngineEvent::NewToken { mint, symbol, .. } => {
                assert_eq!(mint, "m1");
                assert_eq!(symbol, "TST");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            EngineEvent::TokenAdded { mint } => assert_eq!(mint, "m1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_serialise_with_tag() {
        let ev = EngineEvent::StateChanged {
            mint: "m1".into(),
            from: TokenState::New,
            to: TokenState::Pumping,
            reason: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""event":"stateChanged""#), "got {json}");
        assert!(!json.contains("reason"));
    }
}
