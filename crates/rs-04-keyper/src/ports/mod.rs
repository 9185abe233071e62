//! Ports layer of the keyper.
//!
//! - Inbound (Driving): [`KeyperApi`]
//! - Outbound (Driven): [`KeyperStore`]

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
