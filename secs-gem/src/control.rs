//! GEM control state (S1F15/S1F17)

use crate::ack::{OflAck, OnlAck};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlState {
    EquipmentOffline,
    AttemptOnline,
    HostOffline,
    OnlineLocal,
    #[default]
    OnlineRemote,
}

impl ControlState {
    pub fn is_online(self) -> bool {
        matches!(self, ControlState::OnlineLocal | ControlState::OnlineRemote)
    }

    /// Remote commands are only honored in this state
    pub fn is_remote(self) -> bool {
        self == ControlState::OnlineRemote
    }

    /// Host request offline (S1F15)
    pub fn host_offline(self) -> (OflAck, ControlState) {
        let next = if self.is_online() {
            ControlState::HostOffline
        } else {
            self
        };
        (OflAck::Acknowledged, next)
    }

    /// Host request online (S1F17)
    pub fn host_online(self) -> (OnlAck, ControlState) {
        match self {
            ControlState::OnlineLocal | ControlState::OnlineRemote => (OnlAck::AlreadyOnline, self),
            ControlState::HostOffline => (OnlAck::Accepted, ControlState::OnlineRemote),
            ControlState::EquipmentOffline | ControlState::AttemptOnline => {
                (OnlAck::NotAllowed, self)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlState::EquipmentOffline => "EQUIPMENT OFFLINE",
            ControlState::AttemptOnline => "ATTEMPT ONLINE",
            ControlState::HostOffline => "HOST OFFLINE",
            ControlState::OnlineLocal => "ONLINE LOCAL",
            ControlState::OnlineRemote => "ONLINE REMOTE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_then_online() {
        let (ack, state) = ControlState::OnlineRemote.host_offline();
        assert_eq!(ack, OflAck::Acknowledged);
        assert_eq!(state, ControlState::HostOffline);
        assert!(!state.is_online());

        let (ack, state) = state.host_online();
        assert_eq!(ack, OnlAck::Accepted);
        assert_eq!(state, ControlState::OnlineRemote);

        let (ack, _) = state.host_online();
        assert_eq!(ack, OnlAck::AlreadyOnline);
    }

    #[test]
    fn test_equipment_offline_refuses_host_online() {
        let (ack, state) = ControlState::EquipmentOffline.host_online();
        assert_eq!(ack, OnlAck::NotAllowed);
        assert_eq!(state, ControlState::EquipmentOffline);
        assert_eq!(ControlState::EquipmentOffline.host_offline().1, ControlState::EquipmentOffline);
    }
}
