//! Registry of `StepExecutor`s keyed by step type.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtins::{
    AnsibleExecutor, ArgoCdAppExecutor, GiteaRepoExecutor, KubernetesExecutor, ScriptExecutor,
    TerraformExecutor, ValidationExecutor, VaultSetupExecutor, WaitExecutor,
};
use super::traits::StepExecutor;

#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in step type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ValidationExecutor));
        registry.register(Arc::new(TerraformExecutor));
        registry.register(Arc::new(AnsibleExecutor));
        registry.register(Arc::new(KubernetesExecutor));
        registry.register(Arc::new(GiteaRepoExecutor));
        registry.register(Arc::new(ArgoCdAppExecutor));
        registry.register(Arc::new(VaultSetupExecutor));
        registry.register(Arc::new(WaitExecutor));
        registry.register(Arc::new(ScriptExecutor));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(executor.step_type().to_string(), executor);
    }

    #[must_use]
    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(step_type).cloned()
    }

    #[must_use]
    pub fn known_types(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_registered_step_type() {
        let registry = ExecutorRegistry::with_builtins();
        for ty in ["validation", "terraform", "ansible", "kubernetes", "gitea-repo", "argocd-app", "vault-setup", "wait", "script"] {
            assert!(registry.get(ty).is_some(), "missing executor for {ty}");
        }
    }

    #[test]
    fn unknown_step_type_returns_none() {
        let registry = ExecutorRegistry::with_builtins();
        assert!(registry.get("does-not-exist").is_none());
    }
}
