//! Static configuration data consulted by the lint rules.
//!
//! Every whitelist, marker list and ceiling lives here so rules never embed
//! literals. [`Policy::github_actions`] reproduces the GitHub Actions preset;
//! a JSON policy file may override any subset of fields.

use serde::{Deserialize, Serialize};

use flowguard_types::Result;

/// Matches `name=value` assignments where the name suggests a credential and
/// the value looks like an inline token.
pub const DEFAULT_INLINE_SECRET_PATTERN: &str =
    r#"(password|token|key|secret)=['"]?[a-zA-Z0-9+/=]{10,}['"]?"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// A runner is accepted when its label contains any of these.
    pub runner_labels: Vec<String>,
    pub permission_scopes: Vec<String>,
    pub permission_levels: Vec<String>,
    /// Command substrings rejected outright.
    pub dangerous_commands: Vec<String>,
    /// A run command containing a download marker, a shell marker and a pipe
    /// is rejected.
    pub download_markers: Vec<String>,
    pub shell_markers: Vec<String>,
    /// Lowercased env-var name fragments that suggest a credential.
    pub secret_markers: Vec<String>,
    /// A suspected secret value is fine when it contains any of these.
    pub secret_reference_markers: Vec<String>,
    pub inline_secret_pattern: String,
    /// Expression contexts whose value is attacker-controlled.
    pub untrusted_contexts: Vec<String>,
    /// Action refs that name a branch rather than a tag or SHA.
    pub mutable_refs: Vec<String>,
    pub cache_actions: Vec<String>,
    pub artifact_upload_actions: Vec<String>,
    pub local_action_prefix: String,
    pub container_action_prefix: String,
    pub limits: Limits,
    /// Report multi-hop `needs` cycles. Off by default: only direct
    /// self-dependencies are rejected otherwise.
    pub detect_dependency_cycles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Upper bound of the structural `timeout-minutes` range (0, max].
    pub max_timeout_minutes: i64,
    pub max_job_timeout_minutes: i64,
    pub max_steps_per_job: usize,
    pub max_jobs: usize,
    pub max_artifact_retention_days: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_timeout_minutes: 600,
            max_job_timeout_minutes: 360,
            max_steps_per_job: 50,
            max_jobs: 20,
            max_artifact_retention_days: 90,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Policy {
    /// Preset for GitHub Actions workflows.
    pub fn github_actions() -> Self {
        Self {
            runner_labels: strings(&["ubuntu-", "windows-", "macos-", "self-hosted"]),
            permission_scopes: strings(&[
                "actions",
                "checks",
                "contents",
                "deployments",
                "issues",
                "packages",
                "pages",
                "pull-requests",
                "repository-projects",
                "security-events",
                "statuses",
            ]),
            permission_levels: strings(&["read", "write", "none"]),
            dangerous_commands: strings(&[
                "rm -rf /",
                "sudo rm -rf",
                "del /s /q",
                "format c:",
                "mkfs",
                "dd if=/dev/zero",
            ]),
            download_markers: strings(&["curl"]),
            shell_markers: strings(&["bash"]),
            secret_markers: strings(&[
                "password",
                "passwd",
                "pwd",
                "secret",
                "token",
                "key",
                "api_key",
                "apikey",
                "auth",
                "credential",
            ]),
            secret_reference_markers: strings(&["${{", "secrets."]),
            inline_secret_pattern: DEFAULT_INLINE_SECRET_PATTERN.to_string(),
            untrusted_contexts: strings(&["github.event", "github.head_ref"]),
            mutable_refs: strings(&["main", "master", "develop"]),
            cache_actions: strings(&["actions/cache"]),
            artifact_upload_actions: strings(&["actions/upload-artifact"]),
            local_action_prefix: "./".into(),
            container_action_prefix: "docker://".into(),
            limits: Limits::default(),
            detect_dependency_cycles: false,
        }
    }

    /// Parse a JSON policy; absent fields keep their preset values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_local_action(&self, uses: &str) -> bool {
        uses.starts_with(&self.local_action_prefix)
    }

    pub fn is_container_action(&self, uses: &str) -> bool {
        uses.starts_with(&self.container_action_prefix)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::github_actions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let policy = Policy::from_json(r#"{"runner_labels": ["linux-arm"], "limits": {"max_jobs": 5}}"#)
            .unwrap();
        assert_eq!(policy.runner_labels, vec!["linux-arm"]);
        assert_eq!(policy.limits.max_jobs, 5);
        assert_eq!(policy.limits.max_steps_per_job, 50);
        assert_eq!(policy.permission_levels, vec!["read", "write", "none"]);
        assert!(!policy.detect_dependency_cycles);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = Policy::from_json("{not json").unwrap_err();
        assert!(matches!(err, flowguard_types::FlowguardError::Json(_)));
    }

    #[test]
    fn action_prefix_helpers() {
        let policy = Policy::default();
        assert!(policy.is_local_action("./.github/actions/setup"));
        assert!(policy.is_container_action("docker://alpine:3.19"));
        assert!(!policy.is_local_action("actions/checkout@v4"));
    }

    #[test]
    fn policy_round_trips_through_json() {
        let policy = Policy::github_actions();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(Policy::from_json(&json).unwrap(), policy);
    }
}
