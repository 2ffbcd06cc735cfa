// =============================================================================
// Shared types used across the Pulsar curve-sniper engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a bonding-curve trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Runtime command delivered by the dashboard / host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Pause trading (open positions keep being managed).
    Stop,
    /// Resume trading.
    Resume,
    /// Graceful shutdown.
    Quit,
}

impl ControlCommand {
    /// Parse a command line as received from the dashboard.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "stop" => Some(Self::Stop),
            "resume" => Some(Self::Resume),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ingress event schema (from the stream source)
// ---------------------------------------------------------------------------

/// A token-creation event as delivered on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreate {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub uri: String,
    pub trader_public_key: String,
    #[serde(default)]
    pub initial_buy: f64,
    pub v_tokens_in_bonding_curve: f64,
    pub v_sol_in_bonding_curve: f64,
    pub market_cap_sol: f64,
    #[serde(default)]
    pub bonding_curve_key: String,
    pub signature: String,
    pub timestamp: i64,
}

/// A buy or sell event as delivered on the wire. The side comes from the
/// `txType` discriminator on the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTrade {
    pub mint: String,
    pub trader_public_key: String,
    pub token_amount: f64,
    pub new_token_balance: f64,
    pub v_tokens_in_bonding_curve: f64,
    pub v_sol_in_bonding_curve: f64,
    pub market_cap_sol: f64,
    pub signature: String,
    pub timestamp: i64,
}

/// Ingress message, discriminated on `txType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "txType", rename_all = "camelCase")]
pub enum StreamEvent {
    Create(TokenCreate),
    Buy(TokenTrade),
    Sell(TokenTrade),
}

impl StreamEvent {
    /// Mint the event refers to.
    pub fn mint(&self) -> &str {
        match self {
            Self::Create(c) => &c.mint,
            Self::Buy(t) | Self::Sell(t) => &t.mint,
        }
    }
}

/// Everything that enters the coordinator's ingress channel. Stream events
/// and commands are never dropped; price updates are droppable analytics.
#[derive(Debug, Clone)]
pub enum IngressEvent {
    Stream(StreamEvent),
    PriceUpdate {
        new_rate: f64,
        old_rate: f64,
        percent_change: f64,
    },
    Command(ControlCommand),
}

/// A trade with its side resolved, as consumed by the token engine.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub mint: String,
    pub trader: String,
    pub side: Side,
    pub token_amount: f64,
    pub new_token_balance: f64,
    pub v_tokens_in_bonding_curve: f64,
    pub v_sol_in_bonding_curve: f64,
    pub market_cap_sol: f64,
    pub signature: String,
    pub timestamp: i64,
}

impl TradeEvent {
    pub fn from_wire(side: Side, t: TokenTrade) -> Self {
        Self {
            mint: t.mint,
            trader: t.trader_public_key,
            side,
            token_amount: t.token_amount,
            new_token_balance: t.new_token_balance,
            v_tokens_in_bonding_curve: t.v_tokens_in_bonding_curve,
            v_sol_in_bonding_curve: t.v_sol_in_bonding_curve,
            market_cap_sol: t.market_cap_sol,
            signature: t.signature,
            timestamp: t.timestamp,
        }
    }

    /// Post-trade spot price derived from the curve reserves.
    pub fn price_sol(&self) -> f64 {
        if self.v_tokens_in_bonding_curve > 0.0 {
            self.v_sol_in_bonding_curve / self.v_tokens_in_bonding_curve
        } else {
            0.0
        }
    }

    /// Quote-denominated volume of this trade at the post-trade price.
    pub fn volume_sol(&self) -> f64 {
        self.token_amount * self.price_sol()
    }
}
