//! The process-wide breakers, keyed by the name of the guarded dependency.

use super::{default_acceptable, Breaker, CircuitBreaker, NopBreaker};
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

lazy_static! {
    static ref BREAKERS: RwLock<HashMap<String, Arc<dyn Breaker>>> = RwLock::new(HashMap::new());
}

fn read_breakers() -> RwLockReadGuard<'static, HashMap<String, Arc<dyn Breaker>>> {
    BREAKERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_breakers() -> RwLockWriteGuard<'static, HashMap<String, Arc<dyn Breaker>>> {
    BREAKERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `get_breaker` returns the breaker of `name`, it is created on first use.
pub fn get_breaker(name: &str) -> Result<Arc<dyn Breaker>> {
    if let Some(b) = read_breakers().get(name) {
        return Ok(b.clone());
    }
    let mut breakers = write_breakers();
    if let Some(b) = breakers.get(name) {
        return Ok(b.clone());
    }
    let b: Arc<dyn Breaker> = Arc::new(CircuitBreaker::new(name)?);
    breakers.insert(name.to_string(), b.clone());
    Ok(b)
}

/// `no_breaker_for` disables the breaking of `name`, every request is admitted afterwards.
pub fn no_breaker_for(name: &str) {
    write_breakers().insert(name.to_string(), Arc::new(NopBreaker::new(name)));
}

pub fn do_request<F>(name: &str, req: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    get_breaker(name)?.do_req(Box::new(req), None, &default_acceptable)
}

pub fn do_with_acceptable<F, A>(name: &str, req: F, acceptable: A) -> Result<()>
where
    F: FnOnce() -> Result<()>,
    A: Fn(Option<&Error>) -> bool,
{
    get_breaker(name)?.do_req(Box::new(req), None, &acceptable)
}

pub fn do_with_fallback<F, B>(name: &str, req: F, fallback: B) -> Result<()>
where
    F: FnOnce() -> Result<()>,
    B: FnOnce(Error) -> Result<()>,
{
    get_breaker(name)?.do_req(Box::new(req), Some(Box::new(fallback)), &default_acceptable)
}

pub fn do_with_fallback_acceptable<F, B, A>(
    name: &str,
    req: F,
    fallback: B,
    acceptable: A,
) -> Result<()>
where
    F: FnOnce() -> Result<()>,
    B: FnOnce(Error) -> Result<()>,
    A: Fn(Option<&Error>) -> bool,
{
    get_breaker(name)?.do_req(Box::new(req), Some(Box::new(fallback)), &acceptable)
}
