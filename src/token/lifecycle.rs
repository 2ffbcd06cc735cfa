// =============================================================================
// Token Lifecycle — guarded state machine for market phases
// =============================================================================
//
// State graph:
//
//   New ──pump──► Pumping ──drawdown──► Drawdown ──rebound──► Recovery / Ready
//                    │                      ▲                     │      │
//                    └──first-pump entry──► │ ◄──new drawdown─────┘      │
//                                           │                            ▼
//                 Ready ──re-pump──► Pumping│          Ready ──open──► Open ──► Closed
//
//   Any non-terminal state can fall to Dead (market-cap floor after first
//   pump) or Unsafe (safety check failed). Dead, Unsafe and Closed are
//   terminal.
//
// Peak / bottom pointer rules:
//   - peak is reset on every Pumping entry and only updated while Pumping;
//     it freezes at Drawdown entry.
//   - bottom is reset on every Drawdown entry and only updated while in
//     Drawdown; entering Recovery preserves it.
//
// Off-table transitions are refused with an error; callers downgrade the
// refusal to a logged warning at runtime.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Market phase of a tracked token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    New,
    Pumping,
    Drawdown,
    Recovery,
    Ready,
    Open,
    Closed,
    Dead,
    Unsafe,
}

impl TokenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dead | Self::Unsafe | Self::Closed)
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Pumping => "pumping",
            Self::Drawdown => "drawdown",
            Self::Recovery => "recovery",
            Self::Ready => "ready",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Dead => "dead",
            Self::Unsafe => "unsafe",
        };
        write!(f, "{s}")
    }
}

/// Suggested position size attached to a Ready entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeHint {
    Full,
    Medium,
    Small,
}

/// A successful transition, to be published as a `StateChanged` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: TokenState,
    pub to: TokenState,
    pub reason: Option<String>,
}

/// Refusal of an off-table transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRefused {
    pub from: TokenState,
    pub to: TokenState,
}

impl std::fmt::Display for TransitionRefused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transition {} -> {} is not allowed", self.from, self.to)
    }
}

impl std::error::Error for TransitionRefused {}

/// Guarded lifecycle machine owned by the token.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    state: TokenState,
    /// Highest price seen during the current pump cycle; frozen at Drawdown
    /// entry, reset on Pumping entry.
    peak_price: f64,
    /// Lowest price seen during the current drawdown cycle; reset on each
    /// Drawdown entry, preserved through Recovery.
    bottom_price: f64,
    /// Completed pump→drawdown→rebound cycles.
    completed_drawdowns: u32,
    /// Hint set when Ready is entered.
    size_hint: Option<SizeHint>,
    /// Timestamp (ms) the current state was entered.
    entered_at: i64,
}

impl LifecycleMachine {
    pub fn new(created_at: i64) -> Self {
        Self {
            state: TokenState::New,
            peak_price: 0.0,
            bottom_price: 0.0,
            completed_drawdowns: 0,
            size_hint: None,
            entered_at: created_at,
        }
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn peak_price(&self) -> f64 {
        self.peak_price
    }

    pub fn bottom_price(&self) -> f64 {
        self.bottom_price
    }

    pub fn completed_drawdowns(&self) -> u32 {
        self.completed_drawdowns
    }

    pub fn size_hint(&self) -> Option<SizeHint> {
        self.size_hint
    }

    pub fn entered_at(&self) -> i64 {
        self.entered_at
    }

    /// Update the peak/bottom pointers for a new price observation.
    /// Pointer movement is restricted to the state that owns the pointer.
    pub fn observe_price(&mut self, price: f64) {
        match self.state {
            TokenState::Pumping => {
                if price > self.peak_price {
                    self.peak_price = price;
                }
            }
            TokenState::Drawdown => {
                if price < self.bottom_price {
                    self.bottom_price = price;
                }
            }
            _ => {}
        }
    }

    /// Percentage decline of `price` from the recorded peak.
    pub fn drawdown_from_peak(&self, price: f64) -> f64 {
        if self.peak_price > 0.0 {
            (self.peak_price - price) / self.peak_price * 100.0
        } else {
            0.0
        }
    }

    /// Percentage rebound of `price` from the recorded bottom.
    pub fn gain_from_bottom(&self, price: f64) -> f64 {
        if self.bottom_price > 0.0 {
            (price - self.bottom_price) / self.bottom_price * 100.0
        } else {
            0.0
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Enter Pumping. Allowed from New (first pump) and from Recovery/Ready
    /// (pump re-detected after a completed drawdown). Resets the peak.
    pub fn mark_pumping(
        &mut self,
        price: f64,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::New | TokenState::Recovery | TokenState::Ready => {
                self.peak_price = price;
                self.size_hint = None;
                Ok(self.commit(TokenState::Pumping, now, Some(reason.into())))
            }
            from => Err(TransitionRefused { from, to: TokenState::Pumping }),
        }
    }

    /// Enter Drawdown from Pumping (guard: a peak was recorded) or from
    /// Recovery (a new drawdown cycle). Resets the bottom.
    pub fn mark_drawdown(
        &mut self,
        price: f64,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::Pumping if self.peak_price > 0.0 => {
                self.bottom_price = price;
                Ok(self.commit(TokenState::Drawdown, now, Some(reason.into())))
            }
            TokenState::Recovery => {
                self.bottom_price = price;
                Ok(self.commit(TokenState::Drawdown, now, Some(reason.into())))
            }
            from => Err(TransitionRefused { from, to: TokenState::Drawdown }),
        }
    }

    /// Enter Recovery from Drawdown (rebound reached but entry conditions not
    /// met yet). Preserves the bottom; counts the drawdown as completed.
    pub fn mark_recovery(
        &mut self,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::Drawdown => {
                self.completed_drawdowns += 1;
                Ok(self.commit(TokenState::Recovery, now, Some(reason.into())))
            }
            from => Err(TransitionRefused { from, to: TokenState::Recovery }),
        }
    }

    /// Enter Ready from Drawdown (safe rebound), Recovery (gain back inside
    /// the entry window), or Pumping (qualified first-pump entry).
    pub fn mark_ready(
        &mut self,
        hint: SizeHint,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::Drawdown => {
                self.completed_drawdowns += 1;
                self.size_hint = Some(hint);
                Ok(self.commit(TokenState::Ready, now, Some(reason.into())))
            }
            TokenState::Recovery | TokenState::Pumping => {
                self.size_hint = Some(hint);
                Ok(self.commit(TokenState::Ready, now, Some(reason.into())))
            }
            from => Err(TransitionRefused { from, to: TokenState::Ready }),
        }
    }

    /// A position was opened on this token.
    pub fn mark_open(&mut self, now: i64) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::Ready => Ok(self.commit(TokenState::Open, now, None)),
            from => Err(TransitionRefused { from, to: TokenState::Open }),
        }
    }

    /// The position on this token was fully closed.
    pub fn mark_closed(
        &mut self,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        match self.state {
            TokenState::Open => Ok(self.commit(TokenState::Closed, now, Some(reason.into()))),
            from => Err(TransitionRefused { from, to: TokenState::Closed }),
        }
    }

    /// Safety check failed. Allowed from any non-terminal state.
    pub fn mark_unsafe(
        &mut self,
        now: i64,
        reasons: &[String],
    ) -> Result<Transition, TransitionRefused> {
        if self.state.is_terminal() {
            return Err(TransitionRefused { from: self.state, to: TokenState::Unsafe });
        }
        Ok(self.commit(TokenState::Unsafe, now, Some(reasons.join("; "))))
    }

    /// Market cap fell to the dead floor after the first pump. Allowed from
    /// any non-terminal state.
    pub fn mark_dead(
        &mut self,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionRefused> {
        if self.state.is_terminal() {
            return Err(TransitionRefused { from: self.state, to: TokenState::Dead });
        }
        Ok(self.commit(TokenState::Dead, now, Some(reason.into())))
    }

    fn commit(&mut self, to: TokenState, now: i64, reason: Option<String>) -> Transition {
        let from = self.state;
        self.state = to;
        self.entered_at = now;
        debug!(from = %from, to = %to, reason = ?reason, "lifecycle transition");
        Transition { from, to, reason }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> LifecycleMachine {
        LifecycleMachine::new(0)
    }

    #[test]
    fn full_happy_path() {
        let mut m = machine();
        assert_eq!(m.state(), TokenState::New);

        m.mark_pumping(1.0, 1, "pump").unwrap();
        assert_eq!(m.state(), TokenState::Pumping);
        assert_eq!(m.entered_at(), 1);
        assert!((m.peak_price() - 1.0).abs() < f64::EPSILON);

        m.observe_price(2.0);
        assert!((m.peak_price() - 2.0).abs() < f64::EPSILON);

        m.mark_drawdown(1.2, 2, "dropped").unwrap();
        assert_eq!(m.state(), TokenState::Drawdown);
        assert!((m.bottom_price() - 1.2).abs() < f64::EPSILON);

        m.observe_price(1.0);
        assert!((m.bottom_price() - 1.0).abs() < f64::EPSILON);

        let t = m.mark_ready(SizeHint::Full, 3, "safe rebound").unwrap();
        assert_eq!(t.from, TokenState::Drawdown);
        assert_eq!(t.to, TokenState::Ready);
        assert_eq!(m.size_hint(), Some(SizeHint::Full));
        assert_eq!(m.completed_drawdowns(), 1);

        m.mark_open(4).unwrap();
        assert_eq!(m.state(), TokenState::Open);

        m.mark_closed(5, "stop_loss").unwrap();
        assert_eq!(m.state(), TokenState::Closed);
        assert!(m.state().is_terminal());
    }

    #[test]
    fn peak_frozen_outside_pumping() {
        let mut m = machine();
        m.mark_pumping(1.0, 1, "pump").unwrap();
        m.observe_price(3.0);
        m.mark_drawdown(2.0, 2, "dropped").unwrap();

        // Peak must not move during drawdown or recovery.
        m.observe_price(5.0);
        assert!((m.peak_price() - 3.0).abs() < f64::EPSILON);

        m.mark_recovery(3, "rebound").unwrap();
        m.observe_price(6.0);
        assert!((m.peak_price() - 3.0).abs() < f64::EPSILON);

        // A new Pumping entry resets the peak.
        m.mark_pumping(6.0, 4, "re-pump").unwrap();
        assert!((m.peak_price() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bottom_preserved_through_recovery_reset_on_new_drawdown() {
        let mut m = machine();
        m.mark_pumping(1.0, 1, "pump").unwrap();
        m.observe_price(4.0);
        m.mark_drawdown(2.0, 2, "dropped").unwrap();
        m.observe_price(1.5);

        m.mark_recovery(3, "rebound").unwrap();
        // Bottom is frozen in recovery.
        m.observe_price(1.0);
        assert!((m.bottom_price() - 1.5).abs() < f64::EPSILON);

        // A new drawdown resets the bottom.
        m.mark_drawdown(1.8, 4, "second leg").unwrap();
        assert!((m.bottom_price() - 1.8).abs() < f64::EPSILON);
    }

    #[test]
    fn drawdown_requires_recorded_peak() {
        let mut m = machine();
        // Straight from New: refused.
        assert!(m.mark_drawdown(1.0, 1, "x").is_err());
        assert_eq!(m.state(), TokenState::New);
    }

    #[test]
    fn off_table_transitions_refused() {
        let mut m = machine();
        assert!(m.mark_open(1).is_err());
        assert!(m.mark_closed(1, "x").is_err());
        assert!(m.mark_recovery(1, "x").is_err());
        assert!(m.mark_ready(SizeHint::Full, 1, "x").is_err());
        assert_eq!(m.state(), TokenState::New);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut m = machine();
        m.mark_dead(1, "mcap floor").unwrap();
        assert_eq!(m.state(), TokenState::Dead);

        assert!(m.mark_pumping(1.0, 2, "pump").is_err());
        assert!(m.mark_unsafe(2, &["x".into()]).is_err());
        assert!(m.mark_dead(2, "again").is_err());
        assert_eq!(m.state(), TokenState::Dead);
    }

    #[test]
    fn unsafe_reachable_from_any_non_terminal() {
        for setup in 0..4 {
            let mut m = machine();
            match setup {
                0 => {}
                1 => {
                    m.mark_pumping(1.0, 1, "pump").unwrap();
                }
                2 => {
                    m.mark_pumping(1.0, 1, "pump").unwrap();
                    m.mark_drawdown(0.5, 2, "drop").unwrap();
                }
                _ => {
                    m.mark_pumping(1.0, 1, "pump").unwrap();
                    m.mark_drawdown(0.5, 2, "drop").unwrap();
                    m.mark_recovery(3, "rebound").unwrap();
                }
            }
            let t = m.mark_unsafe(9, &["creator dumped".into(), "concentrated".into()]).unwrap();
            assert_eq!(t.to, TokenState::Unsafe);
            assert_eq!(t.reason.as_deref(), Some("creator dumped; concentrated"));
        }
    }

    #[test]
    fn gain_and_drawdown_percentages() {
        let mut m = machine();
        m.mark_pumping(1.0, 1, "pump").unwrap();
        m.observe_price(2.0);
        assert!((m.drawdown_from_peak(1.5) - 25.0).abs() < 1e-9);

        m.mark_drawdown(1.0, 2, "drop").unwrap();
        assert!((m.gain_from_bottom(1.25) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_peak_and_bottom_short_circuit_to_zero() {
        let m = machine();
        assert_eq!(m.drawdown_from_peak(1.0), 0.0);
        assert_eq!(m.gain_from_bottom(1.0), 0.0);
    }

    #[test]
    fn recovery_to_ready_keeps_cycle_count() {
        let mut m = machine();
        m.mark_pumping(1.0, 1, "pump").unwrap();
        m.mark_drawdown(0.5, 2, "drop").unwrap();
        m.mark_recovery(3, "rebound").unwrap();
        assert_eq!(m.completed_drawdowns(), 1);

        m.mark_ready(SizeHint::Medium, 4, "window").unwrap();
        // Ready from Recovery does not double-count the cycle.
        assert_eq!(m.completed_drawdowns(), 1);
        assert_eq!(m.size_hint(), Some(SizeHint::Medium));
    }
}
