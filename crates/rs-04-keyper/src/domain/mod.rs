//! # Domain Layer
//!
//! DKG result model and epoch key aggregation. Nothing in here performs I/O.

pub mod dkg;
pub mod epoch_kg;
pub mod errors;

pub use dkg::{DkgResult, Eon, PureDkgResult};
pub use epoch_kg::{aggregate_epoch_secret_key, DecryptionKeyShare};
pub use errors::{KeyperError, StoreError};
