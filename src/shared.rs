//! Process-wide state that is initialised once and never torn down
//!
//! Concurrent first callers share a single initialisation: the HTTP clients
//! are built once and repeated lookups for the same key (destination
//! refinement, airport resolution) never run twice in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tokio::sync::OnceCell;

use crate::config::EndpointsConfig;
use crate::{DirectionsError, Result};

static HTTP_CLIENTS: OnceCell<HttpClients> = OnceCell::const_new();

/// HTTP clients shared by all upstream integrations
#[derive(Debug, Clone)]
pub struct HttpClients {
    /// Single attempt client for the directions proxy and IP fallback
    pub direct: ClientWithMiddleware,
    /// Client retrying transient failures, for POI and geocoding lookups
    pub lookup: ClientWithMiddleware,
}

impl HttpClients {
    pub fn build(endpoints: &EndpointsConfig) -> Result<Self> {
        let base = reqwest::Client::builder()
            .timeout(endpoints.timeout())
            .user_agent(concat!("monastery-directions/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DirectionsError::config(format!("Failed to create HTTP client: {e}")))?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(endpoints.lookup_retries);

        Ok(Self {
            direct: ClientBuilder::new(base.clone()).build(),
            lookup: ClientBuilder::new(base)
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build(),
        })
    }
}

/// Returns the process-wide clients, building them on first use.
/// The endpoints of the first caller win.
pub async fn http_clients(endpoints: &EndpointsConfig) -> Result<&'static HttpClients> {
    HTTP_CLIENTS
        .get_or_try_init(|| async { HttpClients::build(endpoints) })
        .await
}

/// Keyed init-once cells. A value is computed at most once per key unless
/// the initialiser fails, in which case the next caller tries again.
pub struct OnceMap<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut cells = match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Value for `key`, running `init` only if no value exists yet and no
    /// other caller is already computing it.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Value for `key` if it has been computed
    pub fn get(&self, key: &K) -> Option<V> {
        self.cell(key).get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_once_map_single_flight() {
        let map: Arc<OnceMap<String, u32>> = Arc::new(OnceMap::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let map = map.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                map.get_or_try_init(&"rumtek".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(42)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(map.get(&"rumtek".to_string()), Some(42));
    }

    #[tokio::test]
    async fn test_once_map_retries_after_failure() {
        let map: OnceMap<&'static str, u32> = OnceMap::new();

        let first = map
            .get_or_try_init(&"enchey", || async { Err::<u32, _>("offline") })
            .await;
        assert_eq!(first, Err("offline"));
        assert_eq!(map.get(&"enchey"), None);

        let second = map
            .get_or_try_init(&"enchey", || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_http_clients_are_shared() {
        let endpoints = EndpointsConfig::default();
        let first = http_clients(&endpoints).await.unwrap();
        let second = http_clients(&endpoints).await.unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
