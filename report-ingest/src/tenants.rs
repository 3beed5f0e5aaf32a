//! Tenant credentials and the per-tenant backend sessions built from them.

use crate::backend::{Backend, BackendError, Session};
use crate::metrics_defs::SESSIONS_CREATED;
use moka::future::Cache;
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;

/// API key to backend secret. Fixed for the lifetime of the process.
pub struct CredentialTable {
    secrets: HashMap<String, String>,
}

impl CredentialTable {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        CredentialTable { secrets }
    }

    pub fn lookup(&self, api_key: &str) -> Option<&str> {
        self.secrets.get(api_key).map(String::as_str)
    }
}

/// Lazily opened backend sessions, one per API key.
///
/// Concurrent first requests for the same key await a single
/// initialization. A failed initialization is not cached, so the next request
/// tries again. Entries are never evicted.
pub struct SessionCache {
    backend: Arc<dyn Backend>,
    sessions: Cache<String, Arc<dyn Session>>,
}

impl SessionCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        SessionCache {
            backend,
            sessions: Cache::builder().build(),
        }
    }

    pub async fn get_or_init(
        &self,
        api_key: &str,
        secret: &str,
    ) -> Result<Arc<dyn Session>, Arc<BackendError>> {
        self.sessions
            .try_get_with_by_ref(api_key, async {
                let session = self.backend.open_session(api_key, secret).await?;
                counter!(SESSIONS_CREATED).increment(1);
                tracing::info!(api_key, "opened backend session");
                Ok::<_, BackendError>(session)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::FakeBackend;
    use std::time::Duration;

    #[test]
    fn test_credential_lookup() {
        let table = CredentialTable::new(HashMap::from([(
            "key1".to_string(),
            "secret1".to_string(),
        )]));
        assert_eq!(table.lookup("key1"), Some("secret1"));
        assert_eq!(table.lookup("key2"), None);
    }

    #[tokio::test]
    async fn test_session_reused() {
        let (backend, _beacons) = FakeBackend::new();
        let cache = SessionCache::new(backend.clone());

        let first = cache.get_or_init("key1", "secret1").await.unwrap();
        let second = cache.get_or_init("key1", "secret1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.sessions_opened(), 1);

        cache.get_or_init("key2", "secret2").await.unwrap();
        assert_eq!(backend.sessions_opened(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_opens_once() {
        let (backend, _beacons) = FakeBackend::slow(Duration::from_millis(100));
        let cache = Arc::new(SessionCache::new(backend.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_init("key1", "secret1").await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(backend.sessions_opened(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let (backend, _beacons) = FakeBackend::failing();
        let cache = SessionCache::new(backend);

        assert!(cache.get_or_init("key1", "secret1").await.is_err());
        assert!(cache.get_or_init("key1", "secret1").await.is_err());
        assert!(cache.sessions.get("key1").await.is_none());
    }
}
