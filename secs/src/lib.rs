//! secs4rs - Rust implementation of the SECS/GEM protocol stack
//!
//! This library implements HSMS-SS over TCP, the SECS-II item encoding and
//! the GEM equipment and host roles on top of them.
//!
//! # Architecture
//!
//! The workspace is layered, leaf first:
//!
//! - `secs-core`: error taxonomy, SECS-II `Item` tree and `GemId`
//! - `secs-codec`: SECS-II item encoder and decoder
//! - `secs-transport`: TCP and in-memory connectors
//! - `secs-hsms`: HSMS session, transactions and dispatcher
//! - `secs-gem`: GEM entity model, acknowledge codes and message bodies
//! - `secs-equipment`: equipment role
//! - `secs-host`: host role
//!
//! # Usage
//!
//! ```no_run
//! use secs::gem::{CollectionEvent, StatusVariable};
//! use secs::equipment::{EquipmentConfig, GemEquipment};
//! use secs::hsms::HsmsConfig;
//! use secs::Item;
//!
//! # async fn run() -> secs::SecsResult<()> {
//! let hsms = HsmsConfig::passive("0.0.0.0:5000".parse().unwrap()).with_session_id(1);
//! let equipment = GemEquipment::new(EquipmentConfig::new(hsms));
//! equipment
//!     .model()
//!     .register_status_variable(StatusVariable::new(1001u32, "Temperature", "C", Item::u4(350)))?;
//! equipment.model().register_event(CollectionEvent::new(3001u32, "ProcessStarted"))?;
//! equipment.start()?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use secs_core::{GemId, Item, ItemFormat, SecsError, SecsResult};

// Re-export the codec
pub mod codec {
    pub use secs_codec::*;
}

// Re-export transports
pub mod transport {
    pub use secs_transport::*;
}

// Re-export the HSMS session layer
pub mod hsms {
    pub use secs_hsms::*;
}

// Re-export the GEM model
pub mod gem {
    pub use secs_gem::*;
}

// Re-export the equipment role
pub mod equipment {
    pub use secs_equipment::*;
}

// Re-export the host role
pub mod host {
    pub use secs_host::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_round_trip_through_facade() {
        let item = Item::list(vec![Item::ascii("SAMPLE"), Item::binary(vec![1, 2, 3])]);
        let encoded = codec::encode(&item).unwrap();
        assert_eq!(codec::decode(&encoded).unwrap(), item);
    }

    #[test]
    fn test_gem_ids_compare_across_widths() {
        let narrow = GemId::from_item(&Item::u1(42)).unwrap();
        let wide = GemId::from_item(&Item::u8(42)).unwrap();
        assert_eq!(narrow, wide);
    }
}
