//! Best-practice checks. Only artifact retention rejects; the rest surface
//! as warnings or informational findings.

use flowguard_types::ViolationKind;

use super::describe_step;
use crate::validation::{Diagnostic, LintRule, RuleContext, Severity};

const RETENTION_KEY: &str = "retention-days";

pub(crate) struct ActionPinningRule;
impl LintRule for ActionPinningRule {
    fn name(&self) -> &str { "action_pinning" }
    fn kind(&self) -> ViolationKind { ViolationKind::Advisory }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for (i, step) in job.steps.iter().enumerate() {
                let Some(uses) = step.uses.as_deref() else {
                    continue;
                };
                if uses.is_empty() || policy.is_local_action(uses) || policy.is_container_action(uses) {
                    continue;
                }
                let message = match uses.rsplit_once('@') {
                    None => format!("Job '{id}' {} action '{uses}' is not pinned", describe_step(i, step)),
                    Some((_, git_ref)) if policy.mutable_refs.iter().any(|m| m == git_ref) => format!(
                        "Job '{id}' {} action '{uses}' tracks mutable branch '{git_ref}'",
                        describe_step(i, step)
                    ),
                    Some(_) => continue,
                };
                diags.push(
                    Diagnostic::new(self.name(), self.kind(), Severity::Warning, message)
                        .at_step(id, i)
                        .with_fix("Pin the action to a release tag or commit SHA"),
                );
            }
        }
        diags
    }
}

/// Flags a workflow with steps but no caching action.
pub(crate) struct CachingRule;
impl LintRule for CachingRule {
    fn name(&self) -> &str { "dependency_caching" }
    fn kind(&self) -> ViolationKind { ViolationKind::Advisory }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let wf = ctx.workflow;
        if wf.step_count() == 0 {
            return vec![];
        }
        let has_cache = wf.all_steps().any(|(_, step)| {
            step.uses.as_deref().is_some_and(|uses| {
                ctx.policy.cache_actions.iter().any(|c| uses.contains(c.as_str()))
            })
        });
        if has_cache {
            vec![]
        } else {
            vec![Diagnostic::new(
                self.name(),
                self.kind(),
                Severity::Info,
                "No step uses a dependency cache",
            )
            .with_fix("Add an `actions/cache` step for package or build caches")]
        }
    }
}

/// Upload steps must keep `retention-days` an integer within the ceiling.
pub(crate) struct ArtifactRetentionRule;
impl LintRule for ArtifactRetentionRule {
    fn name(&self) -> &str { "artifact_retention" }
    fn kind(&self) -> ViolationKind { ViolationKind::Advisory }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let max_days = policy.limits.max_artifact_retention_days;
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for (i, step) in job.steps.iter().enumerate() {
                let is_upload = step.uses.as_deref().is_some_and(|uses| {
                    policy.artifact_upload_actions.iter().any(|a| uses.contains(a.as_str()))
                });
                let Some(raw) = step.with.get(RETENTION_KEY).filter(|_| is_upload) else {
                    continue;
                };
                let message = match raw.trim().parse::<i64>() {
                    Ok(days) if days > max_days => format!(
                        "Job '{id}' {} keeps artifacts for {days} days, more than {max_days}",
                        describe_step(i, step)
                    ),
                    Ok(_) => continue,
                    Err(_) => format!(
                        "Job '{id}' {} has non-integer {RETENTION_KEY} '{raw}'",
                        describe_step(i, step)
                    ),
                };
                diags.push(
                    self.violation(message)
                        .at_step(id, i)
                        .with_fix(format!("Set {RETENTION_KEY} to at most {max_days}")),
                );
            }
        }
        diags
    }
}
