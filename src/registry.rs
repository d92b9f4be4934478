//! Concurrent provider registry.
//!
//! [`ProviderRegistry`] maps provider names to live [`Provider`] instances.
//! Lookups take a shared read lock; registration, removal and clearing take
//! the exclusive write lock. The lock is `parking_lot`'s eventually fair
//! `RwLock`, so neither readers nor writers starve under contention.
//!
//! Provider methods are never called while the lock is held: names are
//! read before the write lock is taken, and lookups hand out an `Arc`
//! clone so network calls happen after the lock is released.
//!
//! # Example
//!
//! ```rust
//! use authmux::providers::FauxProvider;
//! use authmux::{Error, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new();
//! registry.register_provider(FauxProvider::new());
//!
//! assert_eq!(registry.get("faux").unwrap().name(), "faux");
//! assert!(matches!(registry.get("acme"), Err(Error::NoSuchProvider { .. })));
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::provider::Provider;

/// Name to provider mapping, as returned by [`ProviderRegistry::all`].
pub type Providers = HashMap<String, Arc<dyn Provider>>;

/// Thread-safe catalogue of registered providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Providers>,
}

/// Process-wide default registry.
static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide registry used by the free functions of this
    /// module.
    pub fn global() -> &'static ProviderRegistry {
        GLOBAL.get_or_init(ProviderRegistry::new)
    }

    /// Register providers under their names.
    ///
    /// An existing entry with the same name is replaced. Within one call,
    /// later providers win over earlier ones sharing a name.
    pub fn register<I>(&self, providers: I)
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        let named: Vec<(String, Arc<dyn Provider>)> = providers
            .into_iter()
            .map(|provider| (provider.name().to_string(), provider))
            .collect();

        let mut map = self.providers.write();
        map.extend(named);
    }

    /// Register a single provider and return the shared handle to it.
    pub fn register_provider<P: Provider + 'static>(&self, provider: P) -> Arc<dyn Provider> {
        let provider: Arc<dyn Provider> = Arc::new(provider);
        self.register([Arc::clone(&provider)]);
        provider
    }

    /// Snapshot of every registered provider.
    ///
    /// The returned map is independent of the registry: changes to either
    /// side are not visible in the other.
    pub fn all(&self) -> Providers {
        self.providers.read().clone()
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::no_such_provider(name))
    }

    /// Remove a provider. Fails if nothing is registered under `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.providers
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::no_such_provider(name))
    }

    /// Remove every provider.
    pub fn clear(&self) {
        self.providers.write().clear();
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Whether no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Register providers with the global registry.
///
/// Can be called multiple times; the last provider registered under a
/// name is the one used.
pub fn use_providers<I>(providers: I)
where
    I: IntoIterator<Item = Arc<dyn Provider>>,
{
    ProviderRegistry::global().register(providers);
}

/// Snapshot of the providers in the global registry.
pub fn get_providers() -> Providers {
    ProviderRegistry::global().all()
}

/// Get a provider from the global registry.
pub fn get_provider(name: &str) -> Result<Arc<dyn Provider>> {
    ProviderRegistry::global().get(name)
}

/// Remove a provider from the global registry.
pub fn remove_provider(name: &str) -> Result<()> {
    ProviderRegistry::global().remove(name)
}

/// Remove every provider from the global registry. Mostly useful in tests.
pub fn clear_providers() {
    ProviderRegistry::global().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FauxProvider;

    fn faux(name: &str, user_id: &str) -> Arc<dyn Provider> {
        Arc::new(FauxProvider::new().with_name(name).with_user_id(user_id))
    }

    #[test]
    fn test_registry_new() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(!registry.contains("faux"));
    }

    #[test]
    fn test_registry_debug() {
        let registry = ProviderRegistry::new();
        registry.register([faux("b", "1"), faux("a", "2")]);
        let debug_str = format!("{:?}", registry);
        assert!(debug_str.contains("ProviderRegistry"));
        assert!(debug_str.contains(r#"["a", "b"]"#));
    }

    #[tokio::test]
    async fn test_register_last_write_wins() {
        let registry = ProviderRegistry::new();
        let fake_a = faux("fake", "a");
        let fake_b = faux("fake", "b");

        registry.register([fake_a, Arc::clone(&fake_b)]);

        let resolved = registry.get("fake").unwrap();
        assert!(Arc::ptr_eq(&resolved, &fake_b));
        assert_eq!(registry.len(), 1);

        let mut session = resolved.begin_auth("state").await.unwrap();
        resolved
            .authorize(session.as_mut(), &crate::CallbackParams::new().with("code", "c"))
            .await
            .unwrap();
        let user = resolved.fetch_user(session.as_ref()).await.unwrap();
        assert_eq!(user.user_id, "b");
    }

    #[test]
    fn test_register_replaces_across_calls() {
        let registry = ProviderRegistry::new();
        let first = faux("fake", "1");
        let second = faux("fake", "2");

        registry.register([Arc::clone(&first)]);
        registry.register([Arc::clone(&second)]);

        assert!(Arc::ptr_eq(&registry.get("fake").unwrap(), &second));
    }

    #[test]
    fn test_clear_then_get_fails() {
        let registry = ProviderRegistry::new();
        registry.register([faux("fake", "a"), faux("fake", "b")]);
        registry.clear();

        match registry.get("fake") {
            Err(Error::NoSuchProvider { name }) => assert_eq!(name, "fake"),
            other => panic!("expected NoSuchProvider, got {:?}", other),
        }
    }

    #[test]
    fn test_all_is_a_snapshot() {
        let registry = ProviderRegistry::new();
        registry.register([faux("one", "1")]);

        let mut snapshot = registry.all();
        assert_eq!(snapshot.len(), 1);

        registry.register([faux("two", "2")]);
        registry.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("one"));

        snapshot.insert("three".to_string(), faux("three", "3"));
        assert!(!registry.contains("three"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_not_idempotent() {
        let registry = ProviderRegistry::new();
        registry.register([faux("x", "1")]);

        assert!(registry.remove("x").is_ok());
        match registry.remove("x") {
            Err(Error::NoSuchProvider { name }) => assert_eq!(name, "x"),
            other => panic!("expected NoSuchProvider, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_unregistered() {
        let registry = ProviderRegistry::new();
        registry.clear();
        let err = registry.remove("unregistered").unwrap_err();
        assert_eq!(err.to_string(), "no provider for unregistered exists");
    }

    #[test]
    fn test_removed_provider_stays_usable_by_holders() {
        let registry = ProviderRegistry::new();
        let handle = registry.register_provider(FauxProvider::new());
        registry.remove("faux").unwrap();

        assert_eq!(handle.name(), "faux");
        assert!(registry.get("faux").is_err());
    }

    #[test]
    fn test_names_sorted() {
        let registry = ProviderRegistry::new();
        registry.register([faux("zeta", "1"), faux("alpha", "2"), faux("mid", "3")]);
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_registered_provider_cannot_be_renamed() {
        let registry = ProviderRegistry::new();
        let mut handle = registry.register_provider(FauxProvider::new());

        // The registry holds a second reference, so exclusive access is refused.
        assert!(Arc::get_mut(&mut handle).is_none());

        registry.clear();
        let provider = Arc::get_mut(&mut handle).unwrap();
        provider.set_name("renamed");
        assert_eq!(handle.name(), "renamed");
    }
}
