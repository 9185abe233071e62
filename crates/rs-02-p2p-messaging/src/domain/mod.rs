//! # Domain Layer
//!
//! Pure messaging logic: validation outcomes, mesh parameters, bootstrap
//! policy, node identity and environments. No I/O.

pub mod bootstrap;
pub mod environment;
pub mod errors;
pub mod identity;
pub mod mesh;
pub mod validation;

pub use bootstrap::{BootstrapAddress, BootstrapPlan};
pub use environment::{Environment, DEFAULT_BOOTSTRAP_PEERS};
pub use errors::{ConfigError, HandlerError, MessagingError, TransportError};
pub use identity::{P2pKey, PeerId};
pub use mesh::{MeshParams, BOOTSTRAP_APP_SCORE, PEER_TARGET};
pub use validation::{check_i64, check_instance_id, combine, ValidationError, ValidationResult};
