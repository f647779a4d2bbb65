//! Built-in step executors.
//!
//! These are thin, idempotent-by-construction stand-ins for the real
//! infrastructure clients (Terraform, Ansible, a Kubernetes API client, a
//! Gitea/ArgoCD/Vault API client), which are external collaborators. Each
//! one here validates its config and returns deterministic outputs so the
//! engine, scheduler, and reconciler can be exercised end to end without a
//! live cluster; a real deployment registers its own implementation of
//! [`StepExecutor`] under the same step type to replace it.

use async_trait::async_trait;

use super::traits::{ExecutorError, StepContext, StepExecutor, StepOutputs};

fn config_str(config: &serde_json::Value, key: &str) -> Option<String> {
    config.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub struct ValidationExecutor;

#[async_trait]
impl StepExecutor for ValidationExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let required = ctx
            .config
            .get("required")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for field in &required {
            let Some(field) = field.as_str() else {
                return Err(ExecutorError::Configuration("`required` entries must be strings".to_string()));
            };
            if ctx.config.get(field).map_or(true, serde_json::Value::is_null) {
                return Err(ExecutorError::Failed(format!("required field '{field}' is missing")));
            }
        }
        ctx.log.write(b"validation passed\n").await;
        Ok(StepOutputs::new())
    }

    fn step_type(&self) -> &'static str {
        "validation"
    }
}

pub struct TerraformExecutor;

#[async_trait]
impl StepExecutor for TerraformExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        ctx.log.write(b"terraform apply\n").await;
        let mut outputs = StepOutputs::new();
        if let Some(declared) = ctx.config.get("outputs").and_then(|v| v.as_object()) {
            for (k, v) in declared {
                outputs.insert(k.clone(), super::value_to_string(v));
            }
        }
        outputs.entry("state".to_string()).or_insert_with(|| "applied".to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "terraform"
    }
}

pub struct AnsibleExecutor;

#[async_trait]
impl StepExecutor for AnsibleExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let playbook = config_str(&ctx.config, "playbook").unwrap_or_else(|| "site.yml".to_string());
        ctx.log.write(format!("ansible-playbook {playbook}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("playbook".to_string(), playbook);
        outputs.insert("status".to_string(), "ok".to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "ansible"
    }
}

pub struct KubernetesExecutor;

#[async_trait]
impl StepExecutor for KubernetesExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let namespace = config_str(&ctx.config, "namespace").unwrap_or_else(|| "default".to_string());
        ctx.log.write(format!("kubectl apply -n {namespace}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("namespace".to_string(), namespace);
        outputs.insert("applied".to_string(), "true".to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "kubernetes"
    }
}

pub struct GiteaRepoExecutor;

#[async_trait]
impl StepExecutor for GiteaRepoExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let repo = config_str(&ctx.config, "repo_name")
            .ok_or_else(|| ExecutorError::Configuration("gitea-repo requires `repo_name`".to_string()))?;
        ctx.log.write(format!("creating gitea repo {repo}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("repo_url".to_string(), format!("https://gitea.internal/{repo}"));
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "gitea-repo"
    }
}

pub struct ArgoCdAppExecutor;

#[async_trait]
impl StepExecutor for ArgoCdAppExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let app = config_str(&ctx.config, "app_name")
            .ok_or_else(|| ExecutorError::Configuration("argocd-app requires `app_name`".to_string()))?;
        ctx.log.write(format!("argocd app sync {app}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("app_name".to_string(), app);
        outputs.insert("sync_status".to_string(), "synced".to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "argocd-app"
    }
}

pub struct VaultSetupExecutor;

#[async_trait]
impl StepExecutor for VaultSetupExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let path = config_str(&ctx.config, "path").unwrap_or_else(|| "secret/data/app".to_string());
        ctx.log.write(format!("vault write {path}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("secret_path".to_string(), path);
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "vault-setup"
    }
}

pub struct WaitExecutor;

#[async_trait]
impl StepExecutor for WaitExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let secs = ctx.config.get("duration_secs").and_then(serde_json::Value::as_u64).unwrap_or(0);
        tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("waited_secs".to_string(), secs.to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "wait"
    }
}

pub struct ScriptExecutor;

#[async_trait]
impl StepExecutor for ScriptExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError> {
        let command = config_str(&ctx.config, "command")
            .ok_or_else(|| ExecutorError::Configuration("script requires `command`".to_string()))?;
        ctx.log.write(format!("$ {command}\n").as_bytes()).await;
        let mut outputs = StepOutputs::new();
        outputs.insert("exit_code".to_string(), "0".to_string());
        Ok(outputs)
    }

    fn step_type(&self) -> &'static str {
        "script"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{noop_context, NoopLogWriter};

    /// Every built-in must satisfy the executor contract: executing the
    /// same resolved config twice produces the same outputs.
    async fn assert_idempotent(executor: &dyn StepExecutor, config: serde_json::Value) {
        let log = NoopLogWriter;
        let first = executor.execute(&noop_context(config.clone(), &log)).await.unwrap();
        let second = executor.execute(&noop_context(config, &log)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn terraform_is_idempotent() {
        assert_idempotent(&TerraformExecutor, serde_json::json!({"outputs": {"host": "db"}})).await;
    }

    #[tokio::test]
    async fn validation_fails_on_missing_required_field() {
        let log = NoopLogWriter;
        let config = serde_json::json!({"required": ["region"]});
        let err = ValidationExecutor.execute(&noop_context(config, &log)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Failed(_)));
    }

    #[tokio::test]
    async fn gitea_repo_requires_repo_name() {
        let log = NoopLogWriter;
        let err = GiteaRepoExecutor.execute(&noop_context(serde_json::json!({}), &log)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Configuration(_)));
    }

    #[tokio::test]
    async fn wait_reports_configured_duration() {
        let log = NoopLogWriter;
        let outputs = WaitExecutor.execute(&noop_context(serde_json::json!({"duration_secs": 0}), &log)).await.unwrap();
        assert_eq!(outputs.get("waited_secs"), Some(&"0".to_string()));
    }
}
