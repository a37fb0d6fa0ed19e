//! `WaRelay` Common Library
//!
//! Protocol-level types shared by the relay server and transport bridges.

pub mod jid;
pub mod types;

pub use types::*;
