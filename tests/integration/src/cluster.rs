//! In-process gateway fleet
//!
//! Every node gets its own registries and pub/sub client, all wired to the same
//! in-memory store, broker and directory.

use crate::client::TestClient;
use crate::faults::FaultyStore;
use crate::fixtures::{Directory, TestTokens};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use watch_cache::{MemoryBroker, MemoryStore};
use watch_common::{CorsConfig, SessionConfig, WorkerConfig};
use watch_core::BasicMediaInfo;
use watch_gateway::{create_app, GatewayParts, GatewayState, Repositories};

/// A set of gateway nodes sharing one store and one broker
pub struct TestCluster {
    pub store: Arc<MemoryStore>,
    /// What the nodes actually talk to
    pub faults: Arc<FaultyStore>,
    pub broker: Arc<MemoryBroker>,
    pub directory: Arc<Directory>,
    nodes: Vec<GatewayState>,
}

impl TestCluster {
    /// Start `size` nodes
    pub async fn start(size: usize) -> Result<Self> {
        Self::start_with(size, CorsConfig::default()).await
    }

    /// Start `size` nodes with an origin allowlist
    pub async fn start_with(size: usize, cors: CorsConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let faults = FaultyStore::new(store.clone());
        let broker = MemoryBroker::new();
        let directory = Directory::new();

        let mut nodes = Vec::with_capacity(size);
        for index in 0..size {
            let parts = GatewayParts {
                node_id: format!("node-{index}-{}", uuid::Uuid::new_v4()),
                store: faults.clone(),
                transport: Arc::new(broker.client()),
                repositories: Repositories {
                    users: directory.clone(),
                    rooms: directory.clone(),
                    roles: directory.clone(),
                },
                verifier: Arc::new(TestTokens),
                media: Arc::new(BasicMediaInfo),
                session: SessionConfig::default(),
                cors: cors.clone(),
                workers: WorkerConfig::default(),
            };
            nodes.push(GatewayState::start(parts).await?);
        }

        Ok(Self {
            store,
            faults,
            broker,
            directory,
            nodes,
        })
    }

    pub fn node(&self, index: usize) -> &GatewayState {
        &self.nodes[index]
    }

    /// Open an anonymous connection on a node
    pub fn connect(&self, index: usize) -> TestClient {
        TestClient::connect(self.node(index))
    }

    /// Serve a node over HTTP on an ephemeral port
    pub async fn serve(&self, index: usize) -> Result<TestServer> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let app = create_app(self.node(index).clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(TestServer { addr, _handle: handle })
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.shutdown();
        }
    }
}

/// A node listening on a real socket
pub struct TestServer {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }
}
