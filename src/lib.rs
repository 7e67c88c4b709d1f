//! taskboard library
//!
//! Boards of columns of tasks over heterogeneous storage, behind one
//! versioned wire protocol.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod fsutil;
pub mod ical;
pub mod identity;
pub mod logging;
pub mod protocol;
pub mod sync;
pub mod types;
