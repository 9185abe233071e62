//! # Adapters
//!
//! Implementations of the outbound ports.

pub mod memory_mesh;
pub mod swarm;

pub use memory_mesh::{InMemoryMesh, MeshEndpoint};
pub use swarm::Libp2pTransport;
