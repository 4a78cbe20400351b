//! Registry of stage runners keyed by stage name.

use std::collections::HashMap;
use std::sync::Arc;

use draftsmith_core::{StageName, StageRunner};

/// Holds the runners the worker can dispatch to.
///
/// Built once at startup and shared behind an `Arc`; registration is not
/// expected after the worker starts.
#[derive(Default)]
pub struct StageRegistry {
    runners: HashMap<StageName, Arc<dyn StageRunner>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Registers a runner for `stage`, replacing any previous registration.
    pub fn register(&mut self, stage: StageName, runner: Arc<dyn StageRunner>) -> &mut Self {
        self.runners.insert(stage, runner);
        self
    }

    pub fn get(&self, stage: StageName) -> Option<Arc<dyn StageRunner>> {
        self.runners.get(&stage).cloned()
    }

    pub fn contains(&self, stage: StageName) -> bool {
        self.runners.contains_key(&stage)
    }

    /// Registered stage names, in no particular order.
    pub fn names(&self) -> Vec<StageName> {
        self.runners.keys().copied().collect()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}
