//! GEM layer for SECS/GEM
//!
//! This crate holds the equipment-side entity model ([`GemModel`]), the GEM
//! communication and control state machines, acknowledge codes and the
//! body layouts of the standard GEM messages. [`CommunicationLink`] runs
//! the S1F13 handshake on top of an HSMS connection.
//!
//! # Status
//!
//! - [x] Status/data variables and equipment constants (S1F3, S1F11, S2F13-F16, S2F29)
//! - [x] Dynamic event reports (S2F33-F38, S6F11, S6F15, S6F19)
//! - [x] Remote commands (S2F41)
//! - [x] Alarms (S5F1-F8)
//! - [x] Unformatted process programs (S7F1-F6, S7F17-F20)
//! - [x] Clock (S2F17, S2F31) with time provider and time-set hooks
//! - [x] Application hooks for equipment constants and process programs
//! - [ ] Trace data collection (S2F23)
//! - [ ] Formatted process programs (S7F23)

pub mod ack;
pub mod alarms;
pub mod clock;
pub mod commands;
pub mod communication;
pub mod constants;
pub mod control;
pub mod link;
pub mod messages;
pub mod model;
pub mod programs;
pub mod reports;
pub mod variables;

pub use ack::{
    AckC5, AckC6, AckC7, CommAck, CpAck, DrAck, Eac, ErAck, HcAck, LrAck, OflAck, OnlAck, PpGnt,
    TiAck,
};
pub use alarms::{Alarm, AlarmReport};
pub use clock::{ClockSyncHandler, GemClock, TimeProvider};
pub use commands::{CommandOutcome, CommandParameters, CommandReply, RemoteCommand};
pub use communication::CommunicationState;
pub use constants::{
    ConstantHooks, ConstantInfo, ConstantProvider, ConstantUpdater, ConstantValidator,
    EquipmentConstant,
};
pub use control::ControlState;
pub use link::CommunicationLink;
pub use messages::Identity;
pub use model::GemModel;
pub use programs::{ProgramRequestHandler, ProgramStore, ProgramUploadHandler};
pub use reports::{CollectionEvent, EventReport, Report, ReportDefinition};
pub use variables::{DataVariable, StatusVariable, ValueResolver, VariableInfo};
