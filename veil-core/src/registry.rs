use crate::budget::BudgetPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use veil_common::{Category, EngineId};
use veil_engines::Engine;

/// Static per-engine settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub id: EngineId,
    pub categories: Vec<Category>,
    pub weight: f64,
    pub timeout: Duration,
    pub policy: BudgetPolicy,
    pub enabled: bool,
}

impl EngineSettings {
    pub fn new(id: impl Into<EngineId>) -> Self {
        Self {
            id: id.into(),
            categories: vec![Category::General],
            weight: 1.0,
            timeout: Duration::from_secs(3),
            policy: BudgetPolicy::default(),
            enabled: true,
        }
    }

    pub fn supports(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

pub struct RegisteredEngine {
    pub settings: EngineSettings,
    pub adapter: Arc<dyn Engine>,
    /// Position in configuration order; drives merge tie-breaks.
    pub order: usize,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("engine registered twice: {0}")]
    Duplicate(EngineId),
}

/// Engines in configuration order.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<RegisteredEngine>,
    index: HashMap<EngineId, usize>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        settings: EngineSettings,
        adapter: Arc<dyn Engine>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&settings.id) {
            return Err(RegistryError::Duplicate(settings.id));
        }
        let order = self.entries.len();
        self.index.insert(settings.id.clone(), order);
        self.entries.push(RegisteredEngine {
            settings,
            adapter,
            order,
        });
        Ok(())
    }

    pub fn get(&self, id: &EngineId) -> Option<&RegisteredEngine> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &EngineId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEngine> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
