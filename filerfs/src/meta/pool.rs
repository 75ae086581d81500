//! Connection pool of long-lived metadata clients keyed by address.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{MetaClient, MetaDialer};
use crate::error::FilerResult;

pub struct ConnectionPool {
    dialer: Arc<dyn MetaDialer>,
    clients: Mutex<HashMap<String, Arc<dyn MetaClient>>>,
}

impl ConnectionPool {
    pub fn new(dialer: Arc<dyn MetaDialer>) -> Self {
        Self {
            dialer,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` with the pooled client for `addr`, dialing it on first use.
    ///
    /// The dial happens under the pool lock so an address is dialed at most
    /// once. `f` itself always runs unlocked.
    pub async fn with_client<F, Fut, T>(&self, addr: &str, f: F) -> FilerResult<T>
    where
        F: FnOnce(Arc<dyn MetaClient>) -> Fut,
        Fut: Future<Output = FilerResult<T>>,
    {
        let client = self.client(addr).await?;
        f(client).await
    }

    async fn client(&self, addr: &str) -> FilerResult<Arc<dyn MetaClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(addr) {
            return Ok(existing.clone());
        }
        debug!("no pooled client for {}, dialing", addr);
        let client = self.dialer.dial(addr).await?;
        clients.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
