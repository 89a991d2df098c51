//! Process-wide registry of custom connection resolvers
//!
//! A resolver opens connections for a driver name. Registered resolvers are
//! consulted before the built-in connectors, which is also how drivers
//! without a bundled transport (SQL Server) are supplied.

use crate::database::adapter::DatabaseAdapter;
use crate::database::config::ConnectionConfig;
use crate::error::Result;
use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;

pub type ResolverFuture = BoxFuture<'static, Result<Arc<dyn DatabaseAdapter>>>;

/// Connection name and resolved config in, adapter out
pub type Resolver = Arc<dyn Fn(String, ConnectionConfig) -> ResolverFuture + Send + Sync>;

static RESOLVERS: Lazy<DashMap<String, Resolver>> = Lazy::new(DashMap::new);

/// Register a resolver for `driver`, replacing any previous one
pub fn register_resolver<F, Fut>(driver: &str, resolver: F)
where
    F: Fn(String, ConnectionConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn DatabaseAdapter>>> + Send + 'static,
{
    let resolver: Resolver = Arc::new(move |name, config| Box::pin(resolver(name, config)));
    RESOLVERS.insert(driver.to_ascii_lowercase(), resolver);
    log::debug!("Registered connection resolver for driver [{}]", driver);
}

/// Remove the resolver for `driver`; returns whether one was registered
pub fn unregister_resolver(driver: &str) -> bool {
    RESOLVERS.remove(&driver.to_ascii_lowercase()).is_some()
}

pub fn resolver_for(driver: &str) -> Option<Resolver> {
    RESOLVERS
        .get(&driver.to_ascii_lowercase())
        .map(|entry| Arc::clone(entry.value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_register_and_unregister() {
        register_resolver("resolver-test", |name, _config| async move {
            Err::<Arc<dyn DatabaseAdapter>, _>(Error::configuration(format!("resolved {}", name)))
        });

        let resolver = resolver_for("RESOLVER-TEST").unwrap();
        let err = resolver("main".to_string(), ConnectionConfig::default()).await.err().unwrap();
        assert_eq!(err.to_string(), "resolved main");

        assert!(unregister_resolver("resolver-test"));
        assert!(resolver_for("resolver-test").is_none());
        assert!(!unregister_resolver("resolver-test"));
    }
}
