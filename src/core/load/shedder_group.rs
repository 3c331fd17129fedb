use super::{new_adaptive_shedder, Shedder, ShedderOptions};
use crate::syncx::{Closable, ResourceManager};
use crate::Result;
use std::sync::Arc;

struct ShedderHandle(Arc<dyn Shedder>);

impl Closable for ShedderHandle {
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// ShedderGroup keeps one shedder per key, for example per route,
/// all built from the same options.
pub struct ShedderGroup {
    options: ShedderOptions,
    manager: ResourceManager<ShedderHandle>,
}

impl ShedderGroup {
    pub fn new(options: ShedderOptions) -> Self {
        ShedderGroup {
            options,
            manager: ResourceManager::new(),
        }
    }

    /// `get_shedder` returns the shedder of `key`, it is created on first use.
    pub fn get_shedder(&self, key: &str) -> Result<Arc<dyn Shedder>> {
        let handle = self.manager.get_resource(key, || {
            new_adaptive_shedder(self.options.clone()).map(ShedderHandle)
        })?;
        Ok(handle.0.clone())
    }
}
