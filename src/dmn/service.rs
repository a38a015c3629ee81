use super::evaluation::DecisionEvaluator;
use super::model::Decision;
use super::parser::parse_decision;
use super::storage::{ResourceInfo, ResourceStore};
use crate::config::ServiceConfig;
use crate::errors::ServiceError;
use crate::types::{DecisionKey, DecisionTableResult, OutputRow, Variables};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

type DecisionCache = Arc<Mutex<LruCache<String, Arc<Decision>>>>;

/// Loads named decisions from a [`ResourceStore`] and evaluates them.
///
/// The resource is read on every call. Parsed decisions are cached by content
/// digest, so an edited file is picked up on the next evaluation.
#[derive(Clone)]
pub struct DecisionService {
    config: ServiceConfig,
    store: ResourceStore,
    evaluator: DecisionEvaluator,
    decision_cache: Option<DecisionCache>,
}

impl DecisionService {
    pub fn new(config: ServiceConfig) -> Self {
        let store = ResourceStore::from_config(&config);
        Self::with_store(config, store)
    }

    pub fn with_store(config: ServiceConfig, store: ResourceStore) -> Self {
        let decision_cache = NonZeroUsize::new(config.decision_cache_size)
            .map(|size| Arc::new(Mutex::new(LruCache::new(size))));
        Self {
            config,
            store,
            evaluator: DecisionEvaluator::new(),
            decision_cache,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn evaluator(&self) -> &DecisionEvaluator {
        &self.evaluator
    }

    /// Read and parse the decision `decision_id`, returning it with the resource digest.
    pub fn load_decision(&self, decision_id: &str) -> Result<(Arc<Decision>, String), ServiceError> {
        let resource = self.store.read(decision_id)?;
        let cache_key = format!("{}:{decision_id}", resource.digest);

        if let Some(decision) = self.cached(&cache_key) {
            tracing::trace!(decision = decision_id, "using cached decision");
            return Ok((decision, resource.digest));
        }

        let decision = Arc::new(parse_decision(decision_id, &resource.content)?);
        if let Some(cache) = &self.decision_cache {
            if let Ok(mut cache) = cache.lock() {
                cache.put(cache_key, decision.clone());
            }
        }
        Ok((decision, resource.digest))
    }

    fn cached(&self, cache_key: &str) -> Option<Arc<Decision>> {
        let cache = self.decision_cache.as_ref()?;
        // A poisoned lock only costs a re-parse
        let mut cache = cache.lock().ok()?;
        cache.get(cache_key).cloned()
    }

    pub fn evaluate_by_name(
        &self,
        decision_id: &str,
        variables: &Variables,
    ) -> Result<DecisionTableResult, ServiceError> {
        let (decision, digest) = self.load_decision(decision_id)?;
        let mut result = self.evaluator.evaluate_decision(&decision, variables)?;
        result.digest = Some(digest);

        tracing::info!(
            decision = decision_id,
            variables = variables.len(),
            results = result.len(),
            "evaluated decision"
        );
        Ok(result)
    }

    pub fn evaluate(
        &self,
        key: &DecisionKey,
        variables: &Variables,
    ) -> Result<DecisionTableResult, ServiceError> {
        self.evaluate_by_name(&key.decision_id(), variables)
    }

    /// Evaluate a name/value table and return its configuration rows in rule order.
    pub fn evaluate_rows(
        &self,
        key: &DecisionKey,
        variables: &Variables,
    ) -> Result<Vec<OutputRow>, ServiceError> {
        self.evaluate(key, variables)?.output_rows()
    }

    pub fn list_decisions(&self, filter: Option<&str>) -> Result<Vec<ResourceInfo>, ServiceError> {
        self.store.list(filter)
    }
}

impl Default for DecisionService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}
