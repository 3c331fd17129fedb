use super::SingleFlight;
use crate::base::BatchError;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Closable is a resource released by `ResourceManager::close`.
pub trait Closable: Send + Sync {
    fn close(&self) -> Result<()>;
}

fn closed_error() -> Error {
    Error::msg("resource manager is closed")
}

/// ResourceManager caches the resources by key, each of them is created only once
/// even under concurrent requests, and released all together on `close`.
pub struct ResourceManager<R> {
    // None after close
    resources: RwLock<Option<HashMap<String, Arc<R>>>>,
    single_flight: SingleFlight<String, Arc<R>>,
}

impl<R: Closable> Default for ResourceManager<R> {
    fn default() -> Self {
        ResourceManager {
            resources: RwLock::new(Some(HashMap::new())),
            single_flight: SingleFlight::new(),
        }
    }
}

impl<R: Closable> ResourceManager<R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<HashMap<String, Arc<R>>>> {
        self.resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<HashMap<String, Arc<R>>>> {
        self.resources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self, key: &str) -> Result<Option<Arc<R>>> {
        match self.read().as_ref() {
            Some(resources) => Ok(resources.get(key).cloned()),
            None => Err(closed_error()),
        }
    }

    /// `get_resource` returns the resource of `key`, calling `create` if it is absent.
    /// Concurrent callers of the same key share one `create` and its outcome,
    /// failures are not cached.
    pub fn get_resource<F>(&self, key: &str, create: F) -> Result<Arc<R>>
    where
        F: FnOnce() -> Result<R>,
    {
        if let Some(resource) = self.cached(key)? {
            return Ok(resource);
        }
        self.single_flight.do_call(key.to_string(), || {
            if let Some(resource) = self.cached(key)? {
                return Ok(resource);
            }
            let resource = Arc::new(create()?);
            let mut resources = self.write();
            match resources.as_mut() {
                Some(resources) => {
                    resources.insert(key.to_string(), resource.clone());
                    Ok(resource)
                }
                None => {
                    // closed while creating
                    drop(resources);
                    resource.close()?;
                    Err(closed_error())
                }
            }
        })
    }

    /// `close` closes all the resources and reports every failure.
    /// The manager is not usable afterwards.
    pub fn close(&self) -> Result<()> {
        let resources = match self.write().take() {
            Some(resources) => resources,
            None => return Ok(()),
        };
        let mut be = BatchError::new();
        for (_, resource) in resources {
            if let Err(err) = resource.close() {
                be.add(err);
            }
        }
        be.into_result()
    }
}
