//! Source state machine (protocol states 3 to 7).

use std::fmt;

/// Protocol state of one data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceState {
    /// Manager open, source closed.
    Closed = 3,
    /// Source open, capabilities negotiable.
    Open = 4,
    /// Source enabled, waiting for the user or the device.
    Enabled = 5,
    /// Source signalled `MSG_XFERREADY`.
    TransferReady = 6,
    /// A page transfer is in progress.
    Transferring = 7,
}

impl Default for SourceState {
    fn default() -> Self {
        Self::Closed
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Closed => write!(f, "CLOSED(3)"),
            SourceState::Open => write!(f, "OPEN(4)"),
            SourceState::Enabled => write!(f, "ENABLED(5)"),
            SourceState::TransferReady => write!(f, "XFER_READY(6)"),
            SourceState::Transferring => write!(f, "TRANSFERRING(7)"),
        }
    }
}

impl SourceState {
    /// Numeric protocol state.
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Whether the source has an open session (state 4 and above).
    pub fn is_open(&self) -> bool {
        *self >= SourceState::Open
    }

    /// Whether the source is enabled (state 5 and above).
    pub fn is_enabled(&self) -> bool {
        *self >= SourceState::Enabled
    }

    /// Whether a transfer batch is active (state 6 and above).
    pub fn is_transferring(&self) -> bool {
        *self >= SourceState::TransferReady
    }
}

/// Transitions the protocol defines between source states.
pub fn is_valid_transition(from: SourceState, to: SourceState) -> bool {
    use SourceState::*;
    matches!(
        (from, to),
        (Closed, Open)
            | (Open, Enabled)
            | (Enabled, TransferReady)
            | (TransferReady, Transferring)
            | (Transferring, TransferReady)
            | (Transferring, Enabled)
            | (TransferReady, Enabled)
            | (Enabled, Open)
            | (Open, Closed)
    )
}

/// Tracks the state of one source and logs every change.
#[derive(Debug, Default)]
pub struct SourceStateMachine {
    state: SourceState,
    /// Every state entered, in order, starting with the initial one.
    history: Vec<SourceState>,
}

impl SourceStateMachine {
    pub fn new() -> Self {
        Self {
            state: SourceState::Closed,
            history: vec![SourceState::Closed],
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn history(&self) -> &[SourceState] {
        &self.history
    }

    /// Transition to a new state. Returns the previous state, or `None`
    /// when already there.
    pub fn goto_state(&mut self, new_state: SourceState) -> Option<SourceState> {
        if new_state == self.state {
            return None;
        }
        if !is_valid_transition(self.state, new_state) {
            tracing::warn!(from = %self.state, to = %new_state, "Unexpected state transition");
        }
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        let from = self.state;
        self.state = new_state;
        self.history.push(new_state);
        Some(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(SourceState::Transferring > SourceState::TransferReady);
        assert!(SourceState::Enabled.is_open());
        assert!(!SourceState::Open.is_enabled());
        assert!(SourceState::TransferReady.is_transferring());
        assert_eq!(SourceState::Enabled.level(), 5);
        assert_eq!(SourceState::default(), SourceState::Closed);
    }

    #[test]
    fn test_goto_records_history() {
        let mut machine = SourceStateMachine::new();
        assert_eq!(machine.goto_state(SourceState::Open), Some(SourceState::Closed));
        assert_eq!(machine.goto_state(SourceState::Open), None);
        machine.goto_state(SourceState::Enabled);
        machine.goto_state(SourceState::Open);
        machine.goto_state(SourceState::Closed);
        assert_eq!(
            machine.history(),
            &[
                SourceState::Closed,
                SourceState::Open,
                SourceState::Enabled,
                SourceState::Open,
                SourceState::Closed
            ]
        );
    }

    #[test]
    fn test_transition_table() {
        use SourceState::*;
        assert!(is_valid_transition(Closed, Open));
        assert!(is_valid_transition(Transferring, TransferReady));
        assert!(is_valid_transition(TransferReady, Enabled));
        assert!(!is_valid_transition(Closed, Enabled));
        assert!(!is_valid_transition(Open, Transferring));
        assert!(!is_valid_transition(Enabled, Closed));
    }
}
