use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::node::{AudioNode, NodeConnector, NodeEndpoint};
use crate::error::{MusicError, MusicResult};

/// Linear backoff used when connecting at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            step: Duration::from_secs(2),
        }
    }
}

/// Last `Ready` event seen from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyInfo {
    pub session_id: String,
    pub at: DateTime<Utc>,
}

/// Diagnostic snapshot of one pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub name: String,
    pub uri: String,
    pub connected: bool,
    pub players: usize,
    pub ready: Option<ReadyInfo>,
}

struct PoolEntry {
    node: Arc<dyn AudioNode>,
    ready: Option<ReadyInfo>,
}

/// Process-wide registry of audio node connections.
pub struct NodePool {
    connector: Arc<dyn NodeConnector>,
    endpoint: NodeEndpoint,
    nodes: RwLock<Vec<PoolEntry>>,
    /// Held for the duration of a connection attempt.
    connect_gate: Mutex<()>,
}

impl NodePool {
    pub fn new(connector: Arc<dyn NodeConnector>, endpoint: NodeEndpoint) -> Self {
        Self {
            connector,
            endpoint,
            nodes: RwLock::new(Vec::new()),
            connect_gate: Mutex::new(()),
        }
    }

    pub fn is_any_connected(&self) -> bool {
        self.nodes.read().iter().any(|entry| entry.node.is_connected())
    }

    /// First node that reports itself connected.
    pub fn active_node(&self) -> Option<Arc<dyn AudioNode>> {
        self.nodes
            .read()
            .iter()
            .find(|entry| entry.node.is_connected())
            .map(|entry| entry.node.clone())
    }

    /// Opens one new connection to the configured endpoint.
    pub async fn connect(&self) -> Result<Arc<dyn AudioNode>> {
        let _gate = self.connect_gate.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<Arc<dyn AudioNode>> {
        info!("🎼 Conectando al nodo de audio en {}", self.endpoint.url);

        let node = self.connector.connect(&self.endpoint).await?;

        info!("✅ Nodo de audio conectado: {}", node.uri());
        {
            let mut nodes = self.nodes.write();
            // una sola entrada por URI; las conexiones muertas se reemplazan
            let uri = node.uri();
            nodes.retain(|entry| entry.node.is_connected() && entry.node.uri() != uri);
            nodes.push(PoolEntry {
                node: node.clone(),
                ready: None,
            });
        }

        Ok(node)
    }

    /// Startup connection loop.
    ///
    /// Gives up early as soon as any node is connected. Returns whether a
    /// node is available afterwards; running out of attempts is not fatal.
    pub async fn connect_with_retry(&self, policy: RetryPolicy) -> bool {
        for attempt in 1..=policy.attempts {
            if self.is_any_connected() {
                debug!("Nodo de audio ya conectado, omitiendo intento {}", attempt);
                return true;
            }

            match self.connect().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(
                        "[Lavalink] intento de conexión {}/{} fallido: {:#}",
                        attempt, policy.attempts, e
                    );
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        error!(
            "❌ Sin nodo de audio tras {} intentos, se reintentará con el próximo comando de voz",
            policy.attempts
        );
        self.is_any_connected()
    }

    /// Returns a connected node, connecting lazily if there is none.
    pub async fn ensure_node(&self) -> MusicResult<Arc<dyn AudioNode>> {
        if let Some(node) = self.active_node() {
            return Ok(node);
        }

        let _gate = self.connect_gate.lock().await;
        // otro llamador pudo conectar mientras esperábamos
        if let Some(node) = self.active_node() {
            return Ok(node);
        }

        self.connect_locked().await.map_err(|e| {
            warn!("Falló la conexión diferida al nodo de audio: {:#}", e);
            MusicError::NodeConnectFailure(format!("{:#}", e))
        })
    }

    /// Records a `Ready` event for the node with the given URI.
    pub fn record_ready(&self, uri: &str, session_id: &str) {
        info!("🎧 Nodo Lavalink listo: {} (sesión {})", uri, session_id);

        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|entry| entry.node.uri() == uri) {
            Some(entry) => {
                entry.ready = Some(ReadyInfo {
                    session_id: session_id.to_string(),
                    at: Utc::now(),
                });
            }
            None => debug!("Evento ready de un nodo fuera del pool: {}", uri),
        }
    }

    pub fn list_nodes(&self) -> Vec<NodeStatus> {
        self.nodes
            .read()
            .iter()
            .enumerate()
            .map(|(index, entry)| NodeStatus {
                name: format!("node-{}", index),
                uri: entry.node.uri(),
                connected: entry.node.is_connected(),
                players: entry.node.player_count(),
                ready: entry.ready.clone(),
            })
            .collect()
    }
}
