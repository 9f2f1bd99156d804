// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver name → constructor dispatch.
//!
//! The process-wide [`global`] registry is pre-populated with the built-in
//! drivers; tests build their own [`DriverRegistry`] and register fakes.
//! Registration must complete before the first executor run — the registry
//! is never mutated concurrently with lookups in practice, but is guarded
//! anyway.

use crate::dsn::{Dsn, DriverParams};
use crate::{Driver, DriverError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

/// Everything a driver constructor receives.
#[derive(Debug, Clone)]
pub struct DriverInit {
    /// Namespace tag for every resource the instance creates.
    pub namespace: String,
    pub params: DriverParams,
}

type BoxedDriverFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Driver>, DriverError>> + Send>>;
type DriverCtor = Arc<dyn Fn(DriverInit) -> BoxedDriverFuture + Send + Sync>;

/// Mapping from driver name to constructor.
#[derive(Default)]
pub struct DriverRegistry {
    ctors: RwLock<HashMap<String, DriverCtor>>,
}

impl DriverRegistry {
    /// An empty registry (tests).
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in driver registered.
    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register("docker", |init| {
            Box::pin(async move {
                let driver = crate::docker::DockerDriver::new(init)?;
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            })
        });
        registry.register("native", |init| {
            Box::pin(async move {
                let driver = crate::native::NativeDriver::new(init)?;
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            })
        });
        registry.register("k8s", |init| {
            Box::pin(async move {
                let driver = crate::k8s::KubernetesDriver::connect(init).await?;
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            })
        });
        registry.register("qemu", |init| {
            Box::pin(async move {
                let driver = crate::qemu::QemuDriver::new(init)?;
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            })
        });
        registry
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register<F>(&self, name: &str, ctor: F)
    where
        F: Fn(DriverInit) -> BoxedDriverFuture + Send + Sync + 'static,
    {
        self.ctors.write().insert(name.to_string(), Arc::new(ctor));
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.ctors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the driver a DSN names.
    ///
    /// The driver namespace is the DSN's authority segment when present,
    /// else `default_namespace`.
    pub async fn build(
        &self,
        dsn: &Dsn,
        default_namespace: &str,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let ctor = self.ctors.read().get(&dsn.name).cloned().ok_or_else(|| {
            DriverError::Config(format!(
                "unknown driver {:?} (registered: {})",
                dsn.name,
                self.names().join(", ")
            ))
        })?;
        let init = DriverInit {
            namespace: dsn.namespace.clone().unwrap_or_else(|| default_namespace.to_string()),
            params: dsn.params.clone(),
        };
        tracing::debug!(driver = %dsn.name, namespace = %init.namespace, "constructing driver");
        ctor(init).await
    }
}

/// The process-wide registry with the built-in drivers.
pub fn global() -> &'static DriverRegistry {
    static GLOBAL: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::builtin);
    &GLOBAL
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
