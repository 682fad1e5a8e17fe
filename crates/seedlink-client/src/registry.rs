//! ServerRegistry — shares one `Server` per seed list.
//!
//! The registry is an explicit object owned by the application rather than a
//! process global. Its list is guarded by its own lock, never held while a
//! server lock is taken.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::ConnectionFactory;
use crate::server::Server;
use crate::settings::ServerSettings;

pub struct ServerRegistry {
    factory: Arc<dyn ConnectionFactory>,
    servers: Mutex<Vec<Arc<Server>>>,
}

impl ServerRegistry {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            servers: Mutex::new(Vec::new()),
        }
    }

    /// Return the server whose seed list equals `settings.seeds` as an
    /// ordered sequence, creating and registering one if there is none.
    ///
    /// An existing server keeps the settings it was created with.
    pub async fn create(&self, settings: ServerSettings) -> Arc<Server> {
        let mut servers = self.servers.lock().await;
        if let Some(existing) = servers
            .iter()
            .find(|server| server.seed_list() == settings.seeds.as_slice())
        {
            return Arc::clone(existing);
        }

        let server = Server::new(settings, Arc::clone(&self.factory));
        servers.push(Arc::clone(&server));
        tracing::info!(
            seeds = ?server.seed_list(),
            servers = servers.len(),
            "server registered"
        );
        server
    }

    pub async fn len(&self) -> usize {
        self.servers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.lock().await.is_empty()
    }

    /// Snapshot of registered servers, in registration order.
    pub async fn servers(&self) -> Vec<Arc<Server>> {
        self.servers.lock().await.clone()
    }

    /// Forget `server`. Returns false if it was not registered here.
    pub async fn remove(&self, server: &Arc<Server>) -> bool {
        let mut servers = self.servers.lock().await;
        let before = servers.len();
        servers.retain(|s| !Arc::ptr_eq(s, server));
        servers.len() != before
    }

    /// Disconnect and forget every server.
    pub async fn shutdown(&self) {
        let servers = std::mem::take(&mut *self.servers.lock().await);
        tracing::info!(servers = servers.len(), "shutting down server registry");
        for server in servers {
            server.disconnect().await;
        }
    }
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry").finish_non_exhaustive()
    }
}
