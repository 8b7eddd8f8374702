//! Configuration backed [`StrategyResolver`].

use super::{NotifyRequest, Strategy, StrategyConfig, StrategyResolver};
use crate::error::ResolveError;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Inner {
    strategies: HashMap<u64, StrategyConfig>,
    maintenance: HashSet<String>,
    nodata_keys: Vec<String>,
}

/// Strategies held in memory, replaceable at runtime.
///
/// # Example
/// ```
/// use tocsin::strategy::{StaticStrategies, Strategy, StrategyConfig, StrategyResolver};
///
/// let strategies = StaticStrategies::new();
/// strategies.insert(StrategyConfig {
///     strategy: Strategy::new(7, 1),
///     notifications: Vec::new(),
/// });
/// assert_eq!(strategies.resolve_strategy(7).unwrap().priority, 1);
/// ```
#[derive(Default)]
pub struct StaticStrategies {
    inner: RwLock<Inner>,
}

impl StaticStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        strategies: &[StrategyConfig],
        maintenance: &[String],
        nodata_keys: &[String],
    ) -> Self {
        let source = Self::new();
        source.replace(strategies, maintenance, nodata_keys);
        source
    }

    /// Swaps the whole definition set in one step.
    pub fn replace(
        &self,
        strategies: &[StrategyConfig],
        maintenance: &[String],
        nodata_keys: &[String],
    ) {
        let mut inner = self.inner.write();
        inner.strategies = strategies
            .iter()
            .map(|config| (config.strategy.id, config.clone()))
            .collect();
        inner.maintenance = maintenance.iter().cloned().collect();
        inner.nodata_keys = nodata_keys.to_vec();
    }

    pub fn insert(&self, config: StrategyConfig) {
        self.inner.write().strategies.insert(config.strategy.id, config);
    }

    pub fn set_maintenance(&self, endpoint: &str, enabled: bool) {
        let mut inner = self.inner.write();
        if enabled {
            inner.maintenance.insert(endpoint.to_string());
        } else {
            inner.maintenance.remove(endpoint);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StrategyResolver for StaticStrategies {
    fn resolve_strategy(&self, strategy_id: u64) -> Result<Strategy, ResolveError> {
        self.inner
            .read()
            .strategies
            .get(&strategy_id)
            .map(|config| config.strategy.clone())
            .ok_or_else(|| ResolveError::StrategyNotFound(strategy_id.to_string()))
    }

    fn resolve_notification_requests(
        &self,
        strategy_id: u64,
    ) -> Result<Vec<NotifyRequest>, ResolveError> {
        self.inner
            .read()
            .strategies
            .get(&strategy_id)
            .map(|config| config.notifications.clone())
            .ok_or_else(|| ResolveError::StrategyNotFound(strategy_id.to_string()))
    }

    fn in_maintenance(&self, endpoint: &str) -> bool {
        self.inner.read().maintenance.contains(endpoint)
    }

    fn nodata_keys(&self) -> Vec<String> {
        self.inner.read().nodata_keys.clone()
    }
}
