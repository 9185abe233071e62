//! # Node Runtime
//!
//! ## Startup Sequence
//!
//! Devnet ([`NodeRuntime`]):
//!
//! 1. Assemble the devnet (see [`DevnetContainer`])
//! 2. Start every messaging service; each joins its topics and bootstraps
//! 3. Wait until every node is connected to the mesh
//! 4. Start the collator tasks and the keyper eon publishers
//!
//! Standalone ([`CollatorRuntime`], [`KeyperRuntime`]):
//!
//! 1. Assemble the node on the libp2p transport
//! 2. Start its messaging service and its role tasks
//! 3. The collator also serves its JSON-RPC API
//!
//! ## Shutdown Sequence
//!
//! 1. Flip the shared shutdown channel
//! 2. Join every task, bounded by a timeout

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::server::ServerHandle;
use parking_lot::Mutex;
use rs_03_collator::{start_rpc_server, BatchHandler};
use shutter_telemetry::{TelemetryConfig, TracingHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{
    CollatorContainer, CollatorNodeConfig, DevnetContainer, KeyperContainer, KeyperNodeConfig,
    NodeConfig, NodeError,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type Task = (String, JoinHandle<Result<(), NodeError>>);

fn tracing_handle(telemetry: &TelemetryConfig) -> TracingHandle {
    if telemetry.otlp_enabled {
        TracingHandle::enabled()
    } else {
        TracingHandle::disabled()
    }
}

/// Named tasks sharing one shutdown signal.
pub struct TaskSet {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<Task>>,
}

impl Default for TaskSet {
    fn default() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

impl TaskSet {
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn spawn<F>(&self, name: String, task: F)
    where
        F: Future<Output = Result<(), NodeError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.lock().push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal shutdown and join every task.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        info!("initiating graceful shutdown");
        if self.shutdown_tx.send(true).is_err() {
            warn!("no task listens for shutdown");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut failed = 0usize;
        for (name, handle) in tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    error!(task = %name, error = %e, "task failed");
                    failed += 1;
                }
                Ok(Err(e)) => {
                    error!(task = %name, error = %e, "task panicked");
                    failed += 1;
                }
                Err(_) => {
                    error!(task = %name, "task did not stop in time");
                    failed += 1;
                }
            }
        }
        info!("shutdown complete");
        if failed > 0 {
            return Err(NodeError::Task(format!("{failed} tasks failed")));
        }
        Ok(())
    }
}

// =============================================================================
// DEVNET
// =============================================================================

pub struct NodeRuntime {
    container: Arc<DevnetContainer>,
    tasks: TaskSet,
}

impl NodeRuntime {
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let tracing = tracing_handle(&config.telemetry);
        let tasks = TaskSet::default();
        let container = DevnetContainer::new(config, tracing, tasks.shutdown_signal()).await?;
        Ok(Self {
            container: Arc::new(container),
            tasks,
        })
    }

    pub async fn start(&self) -> Result<(), NodeError> {
        let container = &self.container;

        let messaging = std::iter::once(("collator".to_string(), &container.collator.messaging))
            .chain(
                container
                    .keypers
                    .iter()
                    .map(|k| (format!("keyper-{}", k.index), &k.messaging)),
            );
        for (name, messaging) in messaging {
            let messaging = Arc::clone(messaging);
            let shutdown = self.tasks.shutdown_signal();
            self.tasks.spawn(format!("{name} p2p"), async move {
                messaging.run(shutdown).await.map_err(NodeError::from)
            });
        }
        container.wait_connected(CONNECT_TIMEOUT).await?;

        let collator = Arc::clone(&container.collator.collator);
        self.tasks.spawn("collator".to_string(), async move {
            collator.run().await.map_err(NodeError::from)
        });
        for node in &container.keypers {
            let keyper = Arc::clone(&node.keyper);
            self.tasks.spawn(format!("keyper-{}", node.index), async move {
                keyper.run().await.map_err(NodeError::from)
            });
        }

        info!(
            keypers = container.keypers.len(),
            peers = container.mesh.peer_count(),
            "devnet running"
        );
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.tasks.shutdown().await
    }

    pub fn container(&self) -> Arc<DevnetContainer> {
        Arc::clone(&self.container)
    }

    /// User-facing collator API.
    pub fn collator(&self) -> Arc<BatchHandler> {
        self.container.collator.collator.handler()
    }
}

// =============================================================================
// STANDALONE COLLATOR
// =============================================================================

pub struct CollatorRuntime {
    container: CollatorContainer,
    tasks: TaskSet,
    rpc: Mutex<Option<ServerHandle>>,
}

impl CollatorRuntime {
    pub async fn new(config: CollatorNodeConfig) -> Result<Self, NodeError> {
        let tracing = tracing_handle(&config.telemetry);
        let tasks = TaskSet::default();
        let container = CollatorContainer::new(config, tracing, tasks.shutdown_signal()).await?;
        Ok(Self {
            container,
            tasks,
            rpc: Mutex::new(None),
        })
    }

    /// Start messaging, the collator tasks and the RPC server. Returns the
    /// bound RPC address.
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        let messaging = Arc::clone(&self.container.messaging);
        let shutdown = self.tasks.shutdown_signal();
        self.tasks.spawn("collator p2p".to_string(), async move {
            messaging.run(shutdown).await.map_err(NodeError::from)
        });
        let collator = Arc::clone(&self.container.collator);
        self.tasks.spawn("collator".to_string(), async move {
            collator.run().await.map_err(NodeError::from)
        });

        let settings = &self.container.config.collator;
        let (address, handle) = start_rpc_server(
            self.container.collator.handler(),
            settings.instance_id,
            &settings.rpc_address,
        )
        .await?;
        *self.rpc.lock() = Some(handle);
        info!(rpc = %address, "collator running");
        Ok(address)
    }

    pub async fn shutdown(&self) -> Result<(), NodeError> {
        if let Some(handle) = self.rpc.lock().take() {
            if handle.stop().is_err() {
                warn!("rpc server already stopped");
            }
        }
        self.tasks.shutdown().await
    }

    pub fn container(&self) -> &CollatorContainer {
        &self.container
    }
}

// =============================================================================
// STANDALONE KEYPER
// =============================================================================

pub struct KeyperRuntime {
    container: KeyperContainer,
    tasks: TaskSet,
}

impl KeyperRuntime {
    pub async fn new(config: KeyperNodeConfig) -> Result<Self, NodeError> {
        let tracing = tracing_handle(&config.telemetry);
        let tasks = TaskSet::default();
        let container = KeyperContainer::new(config, tracing, tasks.shutdown_signal()).await?;
        Ok(Self { container, tasks })
    }

    pub async fn start(&self) -> Result<(), NodeError> {
        let name = format!("keyper-{}", self.container.index);
        let messaging = Arc::clone(&self.container.messaging);
        let shutdown = self.tasks.shutdown_signal();
        self.tasks.spawn(format!("{name} p2p"), async move {
            messaging.run(shutdown).await.map_err(NodeError::from)
        });
        let keyper = Arc::clone(&self.container.keyper);
        self.tasks.spawn(name, async move {
            keyper.run().await.map_err(NodeError::from)
        });
        info!(index = self.container.index, "keyper running");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.tasks.shutdown().await
    }

    pub fn container(&self) -> &KeyperContainer {
        &self.container
    }
}
