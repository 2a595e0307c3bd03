//! Core types and utilities for the SECS/GEM protocol stack
//!
//! This crate provides the error taxonomy, the SECS-II [`Item`] tree and the
//! [`GemId`] identifier type shared by every other crate in the workspace.

pub mod datatypes;
pub mod error;
pub mod id;

pub use datatypes::{Item, ItemFormat};
pub use error::{SecsError, SecsResult};
pub use id::GemId;
