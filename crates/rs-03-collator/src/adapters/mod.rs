//! # Adapters
//!
//! | Adapter                 | Port                          |
//! |-------------------------|-------------------------------|
//! | `JsonRpcSequencer`      | `Sequencer`, `L1BlockSource`  |
//! | `MockSequencer`         | `Sequencer`, `L1BlockSource`  |
//! | `InMemoryCollatorStore` | `CollatorStore`               |
//! | `CollatorRpcImpl`       | serves `CollatorApi`          |

pub mod json_rpc;
pub mod memory_store;
pub mod mock_sequencer;
pub mod rpc_server;

pub use json_rpc::JsonRpcSequencer;
pub use memory_store::InMemoryCollatorStore;
pub use mock_sequencer::MockSequencer;
pub use rpc_server::{start_rpc_server, CollatorRpcImpl, CollatorRpcServer};
