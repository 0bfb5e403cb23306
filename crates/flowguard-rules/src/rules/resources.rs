use flowguard_types::ViolationKind;

use crate::validation::{Diagnostic, LintRule, RuleContext};

/// Per-job timeout and step ceilings, then the workflow job ceiling.
pub(crate) struct ResourceLimitsRule;
impl LintRule for ResourceLimitsRule {
    fn name(&self) -> &str { "resource_limits" }
    fn kind(&self) -> ViolationKind { ViolationKind::ResourceLimit }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let limits = &ctx.policy.limits;
        let jobs = &ctx.workflow.jobs;
        let mut diags = Vec::new();

        for (id, job) in jobs {
            if job.timeout_minutes > limits.max_job_timeout_minutes {
                diags.push(
                    self.violation(format!(
                        "Job '{id}' timeout of {} minutes exceeds {}",
                        job.timeout_minutes, limits.max_job_timeout_minutes
                    ))
                    .in_job(id),
                );
            }
            if job.steps.len() > limits.max_steps_per_job {
                diags.push(
                    self.violation(format!(
                        "Job '{id}' has {} steps, more than {}",
                        job.steps.len(),
                        limits.max_steps_per_job
                    ))
                    .in_job(id)
                    .with_fix("Split the job or move steps into a composite action"),
                );
            }
        }

        if jobs.len() > limits.max_jobs {
            diags.push(
                self.violation(format!(
                    "Workflow has {} jobs, more than {}",
                    jobs.len(),
                    limits.max_jobs
                ))
                .with_fix("Split the workflow or use a matrix"),
            );
        }
        diags
    }
}
