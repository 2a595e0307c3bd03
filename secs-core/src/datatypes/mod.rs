//! SECS-II data types

pub mod format;
pub mod item;

pub use format::ItemFormat;
pub use item::Item;
