//! # Inbound Port - KeyperApi
//!
//! What the node assembly and an operator frontend call.
//!
//! | Method           | Purpose                                         |
//! |------------------|-------------------------------------------------|
//! | `add_eon`        | hand over a finished DKG run for an eon         |
//! | `decryption_key` | reconstructed epoch secret key, once known      |

use shared_types::IdentityPreimage;

use crate::domain::{DkgResult, Eon, KeyperError};

pub trait KeyperApi: Send + Sync {
    /// Store the eon and, on success, schedule its public key announcement.
    fn add_eon(&self, eon: Eon, dkg: DkgResult) -> Result<(), KeyperError>;

    fn decryption_key(&self, eon: u64, identity: &IdentityPreimage) -> Option<Vec<u8>>;
}
