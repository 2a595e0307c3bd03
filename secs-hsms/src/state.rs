//! HSMS connection state machine

use secs_core::{SecsError, SecsResult};

/// HSMS connection state
///
/// # State Transitions
/// ```text
/// NotConnected -> Connecting (dial or accept started)
/// Connecting -> NotSelected (TCP established)
/// Connecting -> NotConnected (connect failed)
/// NotSelected -> Selected (select.req/select.rsp accepted)
/// Selected -> NotSelected (deselect)
/// NotSelected | Selected -> NotConnected (separate, T6/T7/T8 expiry, socket error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No TCP connection (initial state)
    #[default]
    NotConnected,
    /// Dialing (active) or waiting for a peer (passive)
    Connecting,
    /// TCP connection up, select procedure not completed
    ///
    /// Only control messages are accepted; data messages are rejected
    /// with reason 4 and T7 bounds the time spent here.
    NotSelected,
    /// Select completed, data messages may flow
    Selected,
}

impl ConnectionState {
    /// Check if data messages may be exchanged
    pub fn is_selected(&self) -> bool {
        matches!(self, ConnectionState::Selected)
    }

    /// Check if a TCP connection is up
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::NotSelected | ConnectionState::Selected)
    }

    /// Validate state transition
    pub fn validate_transition(&self, new_state: ConnectionState) -> SecsResult<()> {
        use ConnectionState::*;
        match (*self, new_state) {
            (NotConnected, Connecting)
            | (Connecting, NotSelected)
            | (Connecting, NotConnected)
            | (NotSelected, Selected)
            | (NotSelected, NotConnected)
            | (Selected, NotSelected)
            | (Selected, NotConnected) => Ok(()),
            (old, new) if old == new => Ok(()),
            _ => Err(SecsError::InvalidState(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "NOT CONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::NotSelected => "NOT SELECTED",
            ConnectionState::Selected => "SELECTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle_transitions() {
        let mut state = ConnectionState::default();
        for next in [
            ConnectionState::Connecting,
            ConnectionState::NotSelected,
            ConnectionState::Selected,
            ConnectionState::NotSelected,
            ConnectionState::NotConnected,
        ] {
            state.validate_transition(next).unwrap();
            state = next;
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(ConnectionState::NotConnected
            .validate_transition(ConnectionState::Selected)
            .is_err());
        assert!(ConnectionState::Connecting
            .validate_transition(ConnectionState::Selected)
            .is_err());
        assert!(ConnectionState::Selected.is_connected());
        assert!(!ConnectionState::NotSelected.is_selected());
    }
}
