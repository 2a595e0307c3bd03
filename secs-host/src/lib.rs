//! GEM host implementation
//!
//! This crate provides the host side of a SECS/GEM link: a typed async
//! request for every GEM exchange and a stream of the equipment's event
//! and alarm reports.
//!
//! # Status
//!
//! ## Connection
//! - [x] Builder for TCP dial and listen endpoints
//! - [x] S1F13 establish communications (both directions)
//! - [x] Reconnect through the HSMS session policy
//!
//! ## Requests
//! - [x] S1F1/S1F3/S1F11/S1F15/S1F17
//! - [x] S2F13/S2F15/S2F17/S2F29/S2F31
//! - [x] S2F33/S2F35/S2F37 dynamic event reports
//! - [x] S2F41 remote commands
//! - [x] S5F3/S5F5/S5F7 alarms
//! - [x] S6F15/S6F19 polled reports
//! - [x] S7F1/S7F3/S7F5/S7F17/S7F19 process programs
//! - [ ] S2F23 trace data collection
//!
//! ## Unsolicited
//! - [x] S6F11 event reports
//! - [x] S5F1 alarm reports

pub mod builder;
pub mod config;
pub mod host;

pub use builder::HostBuilder;
pub use config::HostConfig;
pub use host::{GemHost, HostEvent};
