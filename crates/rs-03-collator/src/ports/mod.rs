//! Ports layer of the collator.
//!
//! - Inbound (Driving): [`CollatorApi`]
//! - Outbound (Driven): sequencer, L1, store and clock

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
