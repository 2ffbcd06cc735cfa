// =============================================================================
// Simulated Wallet — balance, fee settlement, realized P&L bookkeeping
// =============================================================================
//
// All amounts are SOL. Opening a position debits `size * entry_price + buy
// fee`; every exit credits `size_closed * exit_price - sell fee`. The balance
// is never allowed to go negative at an operation boundary: an open that
// would overdraw fails with `InsufficientFunds` and changes nothing.
//
// Realized P&L is tracked twice: gross, and net of every fee paid. A trade
// can be profitable before fees and a loser after them.
// =============================================================================

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

/// Wallet operation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletError {
    InsufficientFunds { required: f64, available: f64 },
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientFunds { required, available } => write!(
                f,
                "insufficient funds: required {required:.6} SOL, available {available:.6} SOL"
            ),
        }
    }
}

impl std::error::Error for WalletError {}

#[derive(Debug)]
struct Inner {
    balance: f64,
    total_fees_paid: f64,
    realized_pnl: f64,
    realized_pnl_with_fees: f64,
}

/// Serialisable wallet snapshot for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSnapshot {
    pub balance_sol: f64,
    pub total_fees_paid_sol: f64,
    pub realized_pnl_sol: f64,
    pub realized_pnl_with_fees_sol: f64,
}

/// Thread-safe simulated wallet.
pub struct SimWallet {
    inner: RwLock<Inner>,
}

impl SimWallet {
    pub fn new(starting_balance: f64) -> Self {
        info!(starting_balance, "simulated wallet initialised");
        Self {
            inner: RwLock::new(Inner {
                balance: starting_balance,
                total_fees_paid: 0.0,
                realized_pnl: 0.0,
                realized_pnl_with_fees: 0.0,
            }),
        }
    }

    pub fn balance(&self) -> f64 {
        self.inner.read().balance
    }

    /// Debit a position open: `size * entry_price + fee`. Fails without any
    /// state change if the balance cannot cover it.
    pub fn debit_open(&self, size: f64, entry_price: f64, fee: f64) -> Result<f64, WalletError> {
        let mut inner = self.inner.write();
        let required = size * entry_price + fee;
        if required > inner.balance {
            return Err(WalletError::InsufficientFunds {
                required,
                available: inner.balance,
            });
        }
        inner.balance -= required;
        inner.total_fees_paid += fee;
        inner.realized_pnl_with_fees -= fee;
        debug!(size, entry_price, fee, balance = inner.balance, "wallet debit (open)");
        Ok(inner.balance)
    }

    /// Credit an exit: `size_closed * exit_price - fee`, and record the gross
    /// P&L realized by that exit.
    pub fn credit_close(
        &self,
        size_closed: f64,
        exit_price: f64,
        fee: f64,
        gross_pnl: f64,
    ) -> f64 {
        let mut inner = self.inner.write();
        inner.balance += size_closed * exit_price - fee;
        inner.total_fees_paid += fee;
        inner.realized_pnl += gross_pnl;
        inner.realized_pnl_with_fees += gross_pnl - fee;
        debug!(
            size_closed,
            exit_price,
            fee,
            gross_pnl,
            balance = inner.balance,
            "wallet credit (close)"
        );
        inner.balance
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let inner = self.inner.read();
        WalletSnapshot {
            balance_sol: inner.balance,
            total_fees_paid_sol: inner.total_fees_paid,
            realized_pnl_sol: inner.realized_pnl,
            realized_pnl_with_fees_sol: inner.realized_pnl_with_fees,
        }
    }
}
