//! Acknowledge codes carried as one-byte binary items

use secs_core::{Item, SecsError};

macro_rules! ack_code {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$variant_meta])* $variant = $value),+
        }

        impl $name {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub const fn code(self) -> u8 {
                self as u8
            }

            /// `B[1]` item holding the code
            pub fn to_item(self) -> Item {
                Item::binary(vec![self as u8])
            }

            /// Decode from a one-byte B or U1 item
            pub fn from_item(item: &Item) -> Option<Self> {
                item.first_byte().and_then(Self::from_u8)
            }
        }
    };
}

ack_code! {
    /// COMMACK (S1F14)
    CommAck {
        Accepted = 0,
        Denied = 1,
    }
}

ack_code! {
    /// OFLACK (S1F16)
    OflAck {
        Acknowledged = 0,
    }
}

ack_code! {
    /// ONLACK (S1F18)
    OnlAck {
        Accepted = 0,
        NotAllowed = 1,
        AlreadyOnline = 2,
    }
}

ack_code! {
    /// EAC (S2F16)
    Eac {
        Accepted = 0,
        DoesNotExist = 1,
        Busy = 2,
        /// Value out of range or of the wrong type
        OutOfRange = 3,
    }
}

ack_code! {
    /// TIACK (S2F32)
    TiAck {
        Accepted = 0,
        NotDone = 1,
        /// Step larger than the equipment allows
        OutOfSyncLimit = 2,
    }
}

ack_code! {
    /// DRACK (S2F34)
    DrAck {
        Accepted = 0,
        InsufficientSpace = 1,
        InvalidFormat = 2,
        AlreadyDefined = 3,
        UnknownVariable = 4,
    }
}

ack_code! {
    /// LRACK (S2F36)
    LrAck {
        Accepted = 0,
        InsufficientSpace = 1,
        InvalidFormat = 2,
        AlreadyLinked = 3,
        UnknownEvent = 4,
        UnknownReport = 5,
    }
}

ack_code! {
    /// ERACK (S2F38)
    ErAck {
        Accepted = 0,
        UnknownEvent = 1,
    }
}

ack_code! {
    /// HCACK (S2F42)
    HcAck {
        Acknowledged = 0,
        InvalidCommand = 1,
        CannotPerformNow = 2,
        InvalidParameter = 3,
        /// Completion will be signalled by an event
        AcknowledgedLater = 4,
        AlreadyInCondition = 5,
        NoSuchObject = 6,
    }
}

ack_code! {
    /// CPACK (S2F42 per-parameter)
    CpAck {
        UnknownParameter = 1,
        IllegalValue = 2,
        IllegalFormat = 3,
    }
}

ack_code! {
    /// ACKC5 (S5F2, S5F4)
    AckC5 {
        Accepted = 0,
        Error = 1,
    }
}

ack_code! {
    /// ACKC6 (S6F12)
    AckC6 {
        Accepted = 0,
        Error = 1,
    }
}

ack_code! {
    /// ACKC7 (S7F4, S7F18)
    AckC7 {
        Accepted = 0,
        PermissionNotGranted = 1,
        LengthError = 2,
        MatrixOverflow = 3,
        PpidNotFound = 4,
        ModeUnsupported = 5,
        OtherError = 6,
    }
}

impl AckC7 {
    /// Code for a process program store or delete failure
    pub fn from_error(err: &SecsError) -> Self {
        match err {
            SecsError::ProgramTooLarge { .. } => AckC7::LengthError,
            SecsError::UnknownProgram(_) => AckC7::PpidNotFound,
            _ => AckC7::OtherError,
        }
    }
}

ack_code! {
    /// PPGNT (S7F2)
    PpGnt {
        Granted = 0,
        AlreadyHave = 1,
        NoSpace = 2,
        InvalidPpid = 3,
        Busy = 4,
        WillNotAccept = 5,
        OtherError = 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_values() {
        assert_eq!(DrAck::UnknownVariable.code(), 4);
        assert_eq!(LrAck::UnknownReport.code(), 5);
        assert_eq!(HcAck::CannotPerformNow.code(), 2);
        assert_eq!(AckC7::PpidNotFound.code(), 4);
        assert_eq!(OnlAck::AlreadyOnline.to_item(), Item::binary(vec![2]));
    }

    #[test]
    fn test_from_item() {
        assert_eq!(Eac::from_item(&Item::binary(vec![3])), Some(Eac::OutOfRange));
        assert_eq!(Eac::from_item(&Item::u1(0)), Some(Eac::Accepted));
        assert_eq!(Eac::from_item(&Item::binary(vec![9])), None);
        assert_eq!(ErAck::from_item(&Item::ascii("0")), None);
    }

    #[test]
    fn test_ackc7_from_store_errors() {
        let too_large = SecsError::ProgramTooLarge {
            id: "BIG".to_string(),
            size: 9,
            limit: 4,
        };
        assert_eq!(AckC7::from_error(&too_large), AckC7::LengthError);
        assert_eq!(
            AckC7::from_error(&SecsError::UnknownProgram("X".to_string())),
            AckC7::PpidNotFound
        );
        assert_eq!(
            AckC7::from_error(&SecsError::InvalidData("x".to_string())),
            AckC7::OtherError
        );
    }
}
