//! GEM equipment implementation
//!
//! This crate wires a [`secs_gem::GemModel`] into an HSMS session and
//! answers the host side of every supported GEM exchange.
//!
//! # Status
//!
//! ## Host requests
//! - [x] S1F1/S1F3/S1F11 identity and status
//! - [x] S1F13 establish communications (both directions)
//! - [x] S1F15/S1F17 offline/online with control-state gating
//! - [x] S2F13/S2F15/S2F29 equipment constants
//! - [x] S2F17/S2F31 clock
//! - [x] S2F33/S2F35/S2F37 dynamic event reports
//! - [x] S2F41 remote commands
//! - [x] S5F3/S5F5/S5F7 alarm management
//! - [x] S6F15/S6F19 event and report requests
//! - [x] S7F1/S7F3/S7F5/S7F17/S7F19 process programs
//! - [ ] S2F23 trace data collection
//!
//! ## Equipment messages
//! - [x] S6F11 event reports
//! - [x] S5F1 alarm reports
//! - [x] S1F1 are-you-there

pub mod config;
mod emitter;
pub mod equipment;
mod handlers;

pub use config::EquipmentConfig;
pub use equipment::GemEquipment;
