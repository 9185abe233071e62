//! Mesh degree parameters.
//!
//! Bootstrap nodes run with a degree of zero: they relay peer records and
//! DHT queries but never join a topic mesh.

/// App-specific score given to bootstrap nodes so that peers accept
/// peer exchange from them.
pub const BOOTSTRAP_APP_SCORE: f64 = 200.0;

/// Connection count peer discovery tries to maintain: three times the
/// default upper mesh degree, for bootstrap nodes too.
pub const PEER_TARGET: usize = 36;

/// Mesh degree parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshParams {
    pub d: usize,
    pub d_lo: usize,
    pub d_hi: usize,
    pub d_out: usize,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            d: 6,
            d_lo: 5,
            d_hi: 12,
            d_out: 2,
        }
    }
}

impl MeshParams {
    /// Bootstrap nodes never join a mesh.
    pub fn for_bootstrap_node() -> Self {
        Self {
            d: 0,
            d_lo: 0,
            d_hi: 0,
            d_out: 0,
        }
    }

    pub fn for_node(is_bootstrap_node: bool) -> Self {
        if is_bootstrap_node {
            Self::for_bootstrap_node()
        } else {
            Self::default()
        }
    }

    pub fn joins_mesh(&self) -> bool {
        self.d > 0
    }
}
