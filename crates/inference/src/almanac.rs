//! Run-scoped fact store with memoization.
//!
//! An [`Almanac`] lives for exactly one engine run. It resolves named
//! facts from three sources:
//! - **Static facts**: values seeded at run start (member profile,
//!   caregiver list, persisted barriers and care plans).
//! - **Dynamic facts**: computed on demand by a registered
//!   [`FactResolver`], which may itself resolve other facts.
//! - **Runtime facts**: written during the run by rule handlers via
//!   [`Almanac::set_runtime_fact`] and visible to all later resolutions.
//!
//! A parameterless fact is computed at most once per run: the first
//! resolution is cached and every later `resolve` returns the cached
//! value. Parameterized resolutions bypass the cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::{InferenceError, Result};

/// Computes a dynamic fact on demand.
///
/// Resolvers receive the almanac so they can consult other facts,
/// including other dynamic facts, enabling composition.
#[async_trait]
pub trait FactResolver: Send + Sync {
    async fn resolve(&self, params: &Value, almanac: &Almanac) -> Result<Value>;
}

/// Run-scoped fact store. See the module docs for the fact taxonomy.
pub struct Almanac {
    /// When true, resolving an unregistered fact yields `None` instead
    /// of [`InferenceError::UnknownFact`]. Every operator treats an
    /// unresolved fact as non-matching.
    allow_undefined: bool,
    resolvers: HashMap<String, Arc<dyn FactResolver>>,
    cache: RwLock<HashMap<String, Value>>,
}

impl Almanac {
    /// Create a strict almanac seeded with static facts.
    pub fn new(static_facts: HashMap<String, Value>) -> Self {
        Self::with_options(static_facts, false)
    }

    /// Create an almanac, optionally tolerating undefined facts.
    pub fn with_options(static_facts: HashMap<String, Value>, allow_undefined: bool) -> Self {
        Self {
            allow_undefined,
            resolvers: HashMap::new(),
            cache: RwLock::new(static_facts),
        }
    }

    /// Register a dynamic fact resolver. Registration happens during
    /// run setup, before any rule is evaluated.
    pub fn add_dynamic_fact(&mut self, fact_id: impl Into<String>, resolver: Arc<dyn FactResolver>) {
        self.resolvers.insert(fact_id.into(), resolver);
    }

    /// Overwrite a fact's cached value for the remainder of the run.
    ///
    /// Subsequent `resolve` calls return the new value without invoking
    /// any resolver.
    pub async fn set_runtime_fact(&self, fact_id: impl Into<String>, value: Value) {
        let fact_id = fact_id.into();
        trace!(fact = %fact_id, "runtime fact written");
        self.cache.write().await.insert(fact_id, value);
    }

    /// Resolve a fact to its value.
    ///
    /// In strict mode an unregistered fact fails with
    /// [`InferenceError::UnknownFact`]; in tolerant mode it yields
    /// `Value::Null`.
    pub async fn resolve(&self, fact_id: &str) -> Result<Value> {
        Ok(self.resolve_opt(fact_id).await?.unwrap_or(Value::Null))
    }

    /// Resolve a fact, distinguishing "undefined" from a null value.
    ///
    /// Returns `Ok(None)` only in tolerant mode for an unregistered
    /// fact; comparisons must treat that as non-matching.
    ///
    /// The cache check and the resolver call are not one atomic step.
    /// The engine evaluates rules sequentially, so within a run each
    /// dynamic fact is computed once. External callers sharing an
    /// almanac across tasks may race on the first resolution: each
    /// racer invokes the resolver, the first write wins the cache, and
    /// every later resolve returns that cached value.
    pub async fn resolve_opt(&self, fact_id: &str) -> Result<Option<Value>> {
        if let Some(cached) = self.cache.read().await.get(fact_id) {
            trace!(fact = %fact_id, "fact cache hit");
            return Ok(Some(cached.clone()));
        }

        match self.resolvers.get(fact_id) {
            Some(resolver) => {
                let value = resolver
                    .resolve(&Value::Null, self)
                    .await
                    .map_err(|e| resolver_error(fact_id, e))?;
                trace!(fact = %fact_id, "dynamic fact computed");
                self.cache
                    .write()
                    .await
                    .entry(fact_id.to_string())
                    .or_insert_with(|| value.clone());
                Ok(Some(value))
            }
            None if self.allow_undefined => {
                trace!(fact = %fact_id, "undefined fact tolerated");
                Ok(None)
            }
            None => Err(InferenceError::UnknownFact(fact_id.to_string())),
        }
    }

    /// Resolve a dynamic fact with explicit parameters, bypassing the
    /// cache. Static and runtime values still win when present.
    pub async fn resolve_with(&self, fact_id: &str, params: &Value) -> Result<Option<Value>> {
        if let Some(cached) = self.cache.read().await.get(fact_id) {
            return Ok(Some(cached.clone()));
        }
        match self.resolvers.get(fact_id) {
            Some(resolver) => Ok(Some(
                resolver
                    .resolve(params, self)
                    .await
                    .map_err(|e| resolver_error(fact_id, e))?,
            )),
            None if self.allow_undefined => Ok(None),
            None => Err(InferenceError::UnknownFact(fact_id.to_string())),
        }
    }
}

fn resolver_error(fact_id: &str, err: InferenceError) -> InferenceError {
    InferenceError::Resolver {
        fact: fact_id.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubler;

    #[async_trait]
    impl FactResolver for Doubler {
        async fn resolve(&self, _params: &Value, almanac: &Almanac) -> Result<Value> {
            let base = almanac.resolve("base").await?;
            Ok(json!(base.as_i64().unwrap_or(0) * 2))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl FactResolver for Counting {
        async fn resolve(&self, _params: &Value, _almanac: &Almanac) -> Result<Value> {
            Ok(json!(self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    fn statics(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn static_fact_resolves() {
        let almanac = Almanac::new(statics(&[("base", json!(21))]));
        assert_eq!(almanac.resolve("base").await.unwrap(), json!(21));
    }

    #[tokio::test]
    async fn dynamic_fact_composes_over_static() {
        let mut almanac = Almanac::new(statics(&[("base", json!(21))]));
        almanac.add_dynamic_fact("doubled", Arc::new(Doubler));
        assert_eq!(almanac.resolve("doubled").await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn dynamic_fact_computed_once() {
        let mut almanac = Almanac::new(HashMap::new());
        almanac.add_dynamic_fact("counter", Arc::new(Counting(AtomicUsize::new(0))));
        assert_eq!(almanac.resolve("counter").await.unwrap(), json!(0));
        assert_eq!(almanac.resolve("counter").await.unwrap(), json!(0));
    }

    #[tokio::test]
    async fn resolver_failure_names_the_dynamic_fact() {
        let mut almanac = Almanac::new(HashMap::new());
        almanac.add_dynamic_fact("doubled", Arc::new(Doubler));
        let err = almanac.resolve("doubled").await.unwrap_err();
        match err {
            InferenceError::Resolver { fact, message } => {
                assert_eq!(fact, "doubled");
                assert!(message.contains("base"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_first_resolutions_settle_on_one_cached_value() {
        let mut almanac = Almanac::new(HashMap::new());
        almanac.add_dynamic_fact("counter", Arc::new(Counting(AtomicUsize::new(0))));
        let almanac = Arc::new(almanac);

        let a = {
            let almanac = almanac.clone();
            tokio::spawn(async move { almanac.resolve("counter").await.unwrap() })
        };
        let b = {
            let almanac = almanac.clone();
            tokio::spawn(async move { almanac.resolve("counter").await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let settled = almanac.resolve("counter").await.unwrap();
        assert!(settled == a || settled == b);
        assert_eq!(settled, almanac.resolve("counter").await.unwrap());
    }

    #[tokio::test]
    async fn runtime_fact_overwrites_cached_value() {
        let almanac = Almanac::new(statics(&[("list", json!([]))]));
        almanac.set_runtime_fact("list", json!(["loneliness"])).await;
        assert_eq!(almanac.resolve("list").await.unwrap(), json!(["loneliness"]));
    }

    #[tokio::test]
    async fn strict_mode_rejects_unknown_fact() {
        let almanac = Almanac::new(HashMap::new());
        let err = almanac.resolve("missing").await.unwrap_err();
        assert!(matches!(err, InferenceError::UnknownFact(f) if f == "missing"));
    }

    #[tokio::test]
    async fn tolerant_mode_yields_undefined() {
        let almanac = Almanac::with_options(HashMap::new(), true);
        assert_eq!(almanac.resolve_opt("missing").await.unwrap(), None);
        assert_eq!(almanac.resolve("missing").await.unwrap(), Value::Null);
    }
}
