// ── Provider registry ──
//
// Maps string ids to constructors for command channels and notification
// sources. Singleton providers are built once and shared; fresh providers
// are built on every resolve.

use std::fmt;
use std::sync::{Arc, OnceLock};

use amplink_api::{AmpClient, NotificationCatcher};
use dashmap::DashMap;
use tracing::debug;

use crate::channel::{CommandChannel, NotificationSource};
use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::provider::AmpChannel;

/// Id of the built-in AMP provider.
pub const AMP_PROVIDER_ID: &str = "amp";

/// How often a provider is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderLifetime {
    /// Built on first resolve, then shared.
    #[default]
    Singleton,
    /// Built on every resolve.
    Fresh,
}

type Factory<T> = Box<dyn Fn() -> Result<Arc<T>, CoreError> + Send + Sync>;

struct Registration<T: ?Sized> {
    lifetime: ProviderLifetime,
    factory: Factory<T>,
    instance: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Registration<T> {
    fn resolve(&self) -> Result<Arc<T>, CoreError> {
        match self.lifetime {
            ProviderLifetime::Fresh => (self.factory)(),
            ProviderLifetime::Singleton => {
                if let Some(existing) = self.instance.get() {
                    return Ok(Arc::clone(existing));
                }
                let built = (self.factory)()?;
                // A concurrent resolve may have won; keep whichever landed first.
                let _ = self.instance.set(Arc::clone(&built));
                Ok(self.instance.get().map_or(built, Arc::clone))
            }
        }
    }
}

/// Id-keyed constructors for one provider kind.
pub struct Providers<T: ?Sized> {
    entries: DashMap<String, Arc<Registration<T>>>,
}

impl<T: ?Sized> Default for Providers<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Providers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("ids", &self.ids())
            .finish()
    }
}

impl<T: ?Sized> Providers<T> {
    /// Register a constructor under `id`, replacing any earlier one.
    pub fn register<F>(&self, id: impl Into<String>, lifetime: ProviderLifetime, factory: F)
    where
        F: Fn() -> Result<Arc<T>, CoreError> + Send + Sync + 'static,
    {
        let id = id.into();
        debug!(provider = %id, ?lifetime, "registering provider");
        self.entries.insert(
            id,
            Arc::new(Registration {
                lifetime,
                factory: Box::new(factory),
                instance: OnceLock::new(),
            }),
        );
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<T>, CoreError> {
        // Clone out of the map so construction never runs under a shard lock.
        let registration = self
            .entries
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| CoreError::UnknownProvider { id: id.to_owned() })?;
        registration.resolve()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|r| r.key().clone()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Registry of command channel and notification source providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    channels: Providers<dyn CommandChannel>,
    sources: Providers<dyn NotificationSource>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in AMP providers, configured from `config`.
    pub fn with_defaults(config: &ManagerConfig) -> Self {
        let registry = Self::new();

        let version = config.amp_version;
        let transport = config.transport_config();
        registry.channels.register(
            AMP_PROVIDER_ID,
            ProviderLifetime::Singleton,
            move || {
                let client = AmpClient::new(version, &transport)?;
                Ok(Arc::new(AmpChannel::new(client)) as Arc<dyn CommandChannel>)
            },
        );

        let catcher = config.catcher.clone();
        registry.sources.register(
            AMP_PROVIDER_ID,
            ProviderLifetime::Singleton,
            move || {
                let source = NotificationCatcher::new(catcher.clone())?;
                Ok(Arc::new(source) as Arc<dyn NotificationSource>)
            },
        );

        registry
    }

    pub fn channels(&self) -> &Providers<dyn CommandChannel> {
        &self.channels
    }

    pub fn sources(&self) -> &Providers<dyn NotificationSource> {
        &self.sources
    }

    pub fn resolve_channel(&self, id: &str) -> Result<Arc<dyn CommandChannel>, CoreError> {
        self.channels.resolve(id)
    }

    pub fn resolve_source(&self, id: &str) -> Result<Arc<dyn NotificationSource>, CoreError> {
        self.sources.resolve(id)
    }

    /// Resolve every provider `config` names, constructing singletons now
    /// so misconfiguration surfaces at startup rather than mid-operation.
    pub fn validate(&self, config: &ManagerConfig) -> Result<(), CoreError> {
        self.resolve_channel(&config.channel_provider)?;
        self.resolve_source(&config.catcher_provider)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ErrorKind;

    struct Null;

    #[async_trait]
    impl CommandChannel for Null {
        fn provider_id(&self) -> &str {
            "null"
        }
    }

    fn counting(
        registry: &ProviderRegistry,
        id: &str,
        lifetime: ProviderLifetime,
    ) -> Arc<AtomicUsize> {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        registry.channels().register(id, lifetime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Null) as Arc<dyn CommandChannel>)
        });
        built
    }

    #[test]
    fn singletons_are_built_once_and_fresh_every_time() {
        let registry = ProviderRegistry::new();
        let single = counting(&registry, "single", ProviderLifetime::Singleton);
        let fresh = counting(&registry, "fresh", ProviderLifetime::Fresh);

        let a = registry.resolve_channel("single").unwrap();
        let b = registry.resolve_channel("single").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(single.load(Ordering::SeqCst), 1);

        registry.resolve_channel("fresh").unwrap();
        registry.resolve_channel("fresh").unwrap();
        assert_eq!(fresh.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_ids_fail_validation() {
        let config = ManagerConfig {
            channel_provider: "nope".into(),
            ..ManagerConfig::default()
        };
        let registry = ProviderRegistry::with_defaults(&config);
        let err = registry.validate(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolFailure);
        assert_eq!(err.key(), "amp.config.unknown_provider");
    }

    #[test]
    fn defaults_register_the_amp_providers() {
        let config = ManagerConfig::default();
        let registry = ProviderRegistry::with_defaults(&config);
        assert_eq!(registry.channels().ids(), vec![AMP_PROVIDER_ID]);
        assert!(registry.sources().contains(AMP_PROVIDER_ID));
        registry.validate(&config).unwrap();
        assert_eq!(
            registry.resolve_channel(AMP_PROVIDER_ID).unwrap().provider_id(),
            AMP_PROVIDER_ID
        );
    }
}
