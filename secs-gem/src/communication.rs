//! GEM communication state

use secs_core::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};

/// Communication state of the GEM layer, above the HSMS selected state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommunicationState {
    Disabled,
    /// Enabled, no establish-communications exchange done yet
    #[default]
    NotCommunicating,
    /// S1F13 sent, waiting for S1F14
    WaitCra,
    /// Waiting before the next S1F13 attempt
    WaitDelay,
    Communicating,
}

impl CommunicationState {
    pub fn is_enabled(self) -> bool {
        self != CommunicationState::Disabled
    }

    pub fn is_communicating(self) -> bool {
        self == CommunicationState::Communicating
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommunicationState::Disabled => "DISABLED",
            CommunicationState::NotCommunicating => "NOT COMMUNICATING",
            CommunicationState::WaitCra => "WAIT CRA",
            CommunicationState::WaitDelay => "WAIT DELAY",
            CommunicationState::Communicating => "COMMUNICATING",
        }
    }

    /// Check that moving from `self` to `to` is allowed.
    ///
    /// Every enabled state may move to `Communicating` (peer S1F13) and
    /// back to `NotCommunicating` (disconnect or deselect).
    pub fn validate_transition(self, to: CommunicationState) -> SecsResult<()> {
        use CommunicationState::*;

        let valid = match (self, to) {
            (a, b) if a == b => true,
            (Disabled, NotCommunicating) => true,
            (_, Disabled) => true,
            (Disabled, _) => false,
            (_, NotCommunicating) => true,
            (_, Communicating) => true,
            (NotCommunicating, WaitCra) | (WaitDelay, WaitCra) => true,
            (WaitCra, WaitDelay) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(SecsError::InvalidState(format!(
                "Invalid communication transition: {:?} -> {:?}",
                self, to
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommunicationState::*;

    #[test]
    fn test_establish_sequence() {
        assert!(NotCommunicating.validate_transition(WaitCra).is_ok());
        assert!(WaitCra.validate_transition(WaitDelay).is_ok());
        assert!(WaitDelay.validate_transition(WaitCra).is_ok());
        assert!(WaitCra.validate_transition(Communicating).is_ok());
        assert!(Communicating.validate_transition(NotCommunicating).is_ok());
    }

    #[test]
    fn test_peer_request_from_any_enabled_state() {
        for state in [NotCommunicating, WaitCra, WaitDelay] {
            assert!(state.validate_transition(Communicating).is_ok());
        }
        assert!(Disabled.validate_transition(Communicating).is_err());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(Communicating.validate_transition(WaitCra).is_err());
        assert!(NotCommunicating.validate_transition(WaitDelay).is_err());
        assert!(Disabled.validate_transition(WaitCra).is_err());
        assert_eq!(CommunicationState::default(), NotCommunicating);
        assert!(!Disabled.is_enabled());
    }
}
