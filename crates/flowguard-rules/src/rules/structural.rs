//! Required sections, job shape and the `needs` graph.

use std::collections::{BTreeMap, HashSet};

use flowguard_types::ViolationKind;

use super::describe_step;
use crate::validation::{Diagnostic, LintRule, RuleContext};

pub(crate) struct WorkflowNameRule;
impl LintRule for WorkflowNameRule {
    fn name(&self) -> &str { "workflow_name" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        if ctx.workflow.name.trim().is_empty() {
            vec![self
                .violation("Workflow has no name".into())
                .with_fix("Add a top-level `name:` key")]
        } else {
            vec![]
        }
    }
}

pub(crate) struct TriggersRule;
impl LintRule for TriggersRule {
    fn name(&self) -> &str { "workflow_triggers" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        if ctx.workflow.on.is_empty() {
            vec![self
                .violation("Workflow has no trigger events".into())
                .with_fix("Add an `on:` section, e.g. `on: push`")]
        } else {
            vec![]
        }
    }
}

pub(crate) struct JobsPresentRule;
impl LintRule for JobsPresentRule {
    fn name(&self) -> &str { "workflow_jobs" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        if ctx.workflow.jobs.is_empty() {
            vec![self
                .violation("Workflow defines no jobs".into())
                .with_fix("Add at least one job under `jobs:`")]
        } else {
            vec![]
        }
    }
}

/// Runner, timeout range, non-empty steps and `uses`/`run` exclusivity.
pub(crate) struct JobShapeRule;
impl LintRule for JobShapeRule {
    fn name(&self) -> &str { "job_shape" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let max_timeout = policy.limits.max_timeout_minutes;
        let mut diags = Vec::new();

        for (id, job) in &ctx.workflow.jobs {
            let runs_on = job.runs_on.trim();
            if runs_on.is_empty() {
                diags.push(
                    self.violation(format!("Job '{id}' has no runs-on"))
                        .in_job(id)
                        .with_fix("Set `runs-on`, e.g. `ubuntu-latest`"),
                );
            } else if !policy
                .runner_labels
                .iter()
                .any(|label| runs_on.contains(label.as_str()))
            {
                diags.push(
                    self.violation(format!("Job '{id}' uses unknown runner '{runs_on}'"))
                        .in_job(id)
                        .with_fix(format!(
                            "Use a runner matching one of: {}",
                            policy.runner_labels.join(", ")
                        )),
                );
            }

            if job.timeout_minutes <= 0 || job.timeout_minutes > max_timeout {
                diags.push(
                    self.violation(format!(
                        "Job '{id}' has timeout-minutes {} outside 1..={max_timeout}",
                        job.timeout_minutes
                    ))
                    .in_job(id),
                );
            }

            if job.steps.is_empty() {
                diags.push(
                    self.violation(format!("Job '{id}' has no steps"))
                        .in_job(id)
                        .with_fix("Add at least one step with `uses` or `run`"),
                );
            }

            for (i, step) in job.steps.iter().enumerate() {
                let message = match (&step.uses, &step.run) {
                    (None, None) => "has neither uses nor run",
                    (Some(_), Some(_)) => "has both uses and run",
                    _ => continue,
                };
                diags.push(
                    self.violation(format!(
                        "Job '{id}' {} {message}",
                        describe_step(i, step)
                    ))
                    .at_step(id, i)
                    .with_fix("A step must have exactly one of `uses` or `run`"),
                );
            }
        }
        diags
    }
}

/// Every `needs` entry names another job of the workflow.
pub(crate) struct NeedsRule;
impl LintRule for NeedsRule {
    fn name(&self) -> &str { "job_needs" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let jobs = &ctx.workflow.jobs;
        let mut diags = Vec::new();
        for (id, job) in jobs {
            for need in &job.needs {
                if !jobs.contains_key(need) {
                    diags.push(
                        self.violation(format!("Job '{id}' needs unknown job '{need}'"))
                            .in_job(id)
                            .with_fix(format!("Define job '{need}' or remove it from `needs`")),
                    );
                } else if need == id {
                    diags.push(
                        self.violation(format!("Job '{id}' depends on itself"))
                            .in_job(id)
                            .with_fix(format!("Remove '{id}' from its own `needs`")),
                    );
                }
            }
        }
        diags
    }
}

/// Multi-hop cycles in the `needs` graph. Self-edges and unknown targets are
/// left to [`NeedsRule`].
pub(crate) struct DependencyCycleRule;
impl LintRule for DependencyCycleRule {
    fn name(&self) -> &str { "dependency_cycles" }
    fn kind(&self) -> ViolationKind { ViolationKind::Structural }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let graph: BTreeMap<&str, Vec<&str>> = ctx
            .workflow
            .jobs
            .iter()
            .map(|(id, job)| {
                let edges = job
                    .needs
                    .iter()
                    .map(String::as_str)
                    .filter(|n| *n != id.as_str() && ctx.workflow.jobs.contains_key(*n))
                    .collect();
                (id.as_str(), edges)
            })
            .collect();

        let mut done: HashSet<&str> = HashSet::new();
        let mut reported: HashSet<Vec<&str>> = HashSet::new();
        let mut diags = Vec::new();

        for &root in graph.keys() {
            if done.contains(root) {
                continue;
            }
            let mut path = Vec::new();
            find_cycles(root, &graph, &mut path, &mut done, &mut |cycle| {
                // Normalize rotation so each cycle is reported once.
                let start = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, id)| **id)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                let mut key = cycle[start..].to_vec();
                key.extend_from_slice(&cycle[..start]);
                if reported.insert(key.clone()) {
                    let mut shown = key.clone();
                    shown.push(key[0]);
                    diags.push(
                        self.violation(format!("Jobs form a dependency cycle: {}", shown.join(" -> ")))
                            .in_job(key[0])
                            .with_fix("Break the cycle by removing one of the `needs` entries"),
                    );
                }
            });
        }
        diags
    }
}

fn find_cycles<'a>(
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    on_cycle: &mut dyn FnMut(&[&'a str]),
) {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        on_cycle(&path[pos..]);
        return;
    }
    if done.contains(node) {
        return;
    }
    path.push(node);
    for &next in graph.get(node).map(Vec::as_slice).unwrap_or_default() {
        find_cycles(next, graph, path, done, on_cycle);
    }
    path.pop();
    done.insert(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use flowguard_parse::{parse, Workflow};
    use regex::Regex;

    fn run(rule: &dyn LintRule, wf: &Workflow) -> Vec<Diagnostic> {
        let policy = Policy::default();
        let re = Regex::new(&policy.inline_secret_pattern).unwrap();
        rule.apply(&RuleContext {
            workflow: wf,
            policy: &policy,
            inline_secret: &re,
        })
    }

    fn job(body: &str) -> Workflow {
        parse(&format!("name: t\non: push\njobs:\n  a:\n{body}")).unwrap()
    }

    #[test]
    fn missing_sections() {
        let wf = parse("").unwrap();
        assert_eq!(run(&WorkflowNameRule, &wf).len(), 1);
        assert_eq!(run(&TriggersRule, &wf).len(), 1);
        assert_eq!(run(&JobsPresentRule, &wf).len(), 1);
    }

    #[test]
    fn whitespace_name_counts_as_missing() {
        let wf = Workflow {
            name: "   ".into(),
            ..Workflow::default()
        };
        assert_eq!(run(&WorkflowNameRule, &wf)[0].rule, "workflow_name");
    }

    #[test]
    fn runner_whitelist_is_substring_match() {
        let ok = job("    runs-on: self-hosted-gpu\n    steps:\n      - run: x\n");
        assert!(run(&JobShapeRule, &ok).is_empty());

        let bad = job("    runs-on: arm-box\n    steps:\n      - run: x\n");
        let diags = run(&JobShapeRule, &bad);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unknown runner 'arm-box'"));
        assert_eq!(diags[0].job.as_deref(), Some("a"));
    }

    #[test]
    fn missing_runner_is_reported_once() {
        let wf = job("    steps:\n      - run: x\n");
        let diags = run(&JobShapeRule, &wf);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("no runs-on"));
    }

    #[test]
    fn timeout_bounds() {
        for (minutes, ok) in [(0, false), (1, true), (600, true), (601, false), (-5, false)] {
            let wf = job(&format!(
                "    runs-on: ubuntu-latest\n    timeout-minutes: {minutes}\n    steps:\n      - run: x\n"
            ));
            assert_eq!(run(&JobShapeRule, &wf).is_empty(), ok, "timeout {minutes}");
        }
    }

    #[test]
    fn step_exclusivity() {
        let wf = job("    runs-on: ubuntu-latest\n    steps:\n      - uses: a/b@v1\n        run: echo\n      - name: empty\n");
        let diags = run(&JobShapeRule, &wf);
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message.contains("both uses and run"));
        assert_eq!(diags[0].step, Some(0));
        assert!(diags[1].message.contains("step 2 ('empty') has neither"));
    }

    #[test]
    fn empty_steps() {
        let wf = job("    runs-on: ubuntu-latest\n");
        let diags = run(&JobShapeRule, &wf);
        assert!(diags[0].message.contains("has no steps"));
    }

    #[test]
    fn needs_unknown_and_self() {
        let wf = parse("jobs:\n  a:\n    needs: [ghost]\n  b:\n    needs: b\n  c:\n    needs: [a]\n").unwrap();
        let diags = run(&NeedsRule, &wf);
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message.contains("unknown job 'ghost'"));
        assert!(diags[1].message.contains("'b' depends on itself"));
    }

    #[test]
    fn detects_multi_hop_cycle_once() {
        let wf = parse("jobs:\n  a:\n    needs: c\n  b:\n    needs: a\n  c:\n    needs: b\n  d:\n    needs: a\n").unwrap();
        let diags = run(&DependencyCycleRule, &wf);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "Jobs form a dependency cycle: a -> c -> b -> a");
    }

    #[test]
    fn acyclic_graph_and_self_edges_are_ignored() {
        let wf = parse("jobs:\n  a:\n    needs: a\n  b:\n    needs: [a, ghost]\n  c:\n    needs: [a, b]\n").unwrap();
        assert!(run(&DependencyCycleRule, &wf).is_empty());
    }
}
