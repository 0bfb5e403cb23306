//! Action references, run commands, permissions, secrets and injection.

use flowguard_parse::StringMap;
use flowguard_types::ViolationKind;

use super::describe_step;
use crate::policy::Policy;
use crate::validation::{Diagnostic, LintRule, RuleContext};

/// Opening delimiter of a templated expression.
const EXPRESSION_OPEN: &str = "${{";

pub(crate) struct ActionReferenceRule;
impl LintRule for ActionReferenceRule {
    fn name(&self) -> &str { "action_reference" }
    fn kind(&self) -> ViolationKind { ViolationKind::Security }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for (i, step) in job.steps.iter().enumerate() {
                let Some(uses) = step.uses.as_deref().filter(|u| !u.is_empty()) else {
                    continue;
                };
                if uses.contains("..") {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} references '{uses}' with a path traversal",
                            describe_step(i, step)
                        ))
                        .at_step(id, i),
                    );
                } else if !policy.is_container_action(uses)
                    && !policy.is_local_action(uses)
                    && !uses.contains('/')
                {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} references '{uses}', expected owner/repo",
                            describe_step(i, step)
                        ))
                        .at_step(id, i)
                        .with_fix("Use `owner/repo@ref`, `./path` or `docker://image`"),
                    );
                }
            }
        }
        diags
    }
}

pub(crate) struct RunCommandRule;
impl LintRule for RunCommandRule {
    fn name(&self) -> &str { "run_command" }
    fn kind(&self) -> ViolationKind { ViolationKind::Security }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for (i, step) in job.steps.iter().enumerate() {
                let Some(run) = step.run.as_deref() else {
                    continue;
                };
                if let Some(pattern) = policy
                    .dangerous_commands
                    .iter()
                    .find(|p| run.contains(p.as_str()))
                {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} runs dangerous command '{pattern}'",
                            describe_step(i, step)
                        ))
                        .at_step(id, i),
                    );
                } else if is_piped_download(run, policy) {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} pipes a download into a shell",
                            describe_step(i, step)
                        ))
                        .at_step(id, i)
                        .with_fix("Download to a file and verify its checksum before running it"),
                    );
                }
            }
        }
        diags
    }
}

fn is_piped_download(run: &str, policy: &Policy) -> bool {
    let contains_any = |markers: &[String]| markers.iter().any(|m| run.contains(m.as_str()));
    run.contains('|') && contains_any(&policy.download_markers) && contains_any(&policy.shell_markers)
}

/// Permission vocabulary at workflow and job scope.
pub(crate) struct PermissionsRule;
impl PermissionsRule {
    fn check(&self, scope: &str, job: Option<&str>, map: &StringMap, policy: &Policy) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (key, value) in map {
            let message = if !policy.permission_scopes.iter().any(|s| s == key) {
                format!("{scope} declares unknown permission '{key}'")
            } else if !policy.permission_levels.iter().any(|l| l == value) {
                format!(
                    "{scope} grants '{key}' level '{value}', expected one of: {}",
                    policy.permission_levels.join(", ")
                )
            } else {
                continue;
            };
            let mut diag = self.violation(message);
            if let Some(job) = job {
                diag = diag.in_job(job);
            }
            diags.push(diag);
        }
        diags
    }
}

impl LintRule for PermissionsRule {
    fn name(&self) -> &str { "permissions" }
    fn kind(&self) -> ViolationKind { ViolationKind::Security }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let wf = ctx.workflow;
        let mut diags = self.check("Workflow", None, &wf.permissions, ctx.policy);
        for (id, job) in &wf.jobs {
            diags.extend(self.check(&format!("Job '{id}'"), Some(id), &job.permissions, ctx.policy));
        }
        diags
    }
}

/// Literal credentials in job/step env and inline `name=value` tokens in
/// run commands.
pub(crate) struct HardcodedSecretRule;
impl HardcodedSecretRule {
    fn env_secrets(&self, env: &StringMap, policy: &Policy) -> Vec<String> {
        env.iter()
            .filter(|(key, value)| {
                let key = key.to_lowercase();
                !value.is_empty()
                    && policy.secret_markers.iter().any(|m| key.contains(m.as_str()))
                    && !policy
                        .secret_reference_markers
                        .iter()
                        .any(|m| value.contains(m.as_str()))
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl LintRule for HardcodedSecretRule {
    fn name(&self) -> &str { "hardcoded_secrets" }
    fn kind(&self) -> ViolationKind { ViolationKind::Security }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let policy = ctx.policy;
        let fix = "Move the value into repository secrets and reference it with `${{ secrets.NAME }}`";
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for key in self.env_secrets(&job.env, policy) {
                diags.push(
                    self.violation(format!("Job '{id}' env '{key}' looks like a hardcoded secret"))
                        .in_job(id)
                        .with_fix(fix),
                );
            }
            for (i, step) in job.steps.iter().enumerate() {
                for key in self.env_secrets(&step.env, policy) {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} env '{key}' looks like a hardcoded secret",
                            describe_step(i, step)
                        ))
                        .at_step(id, i)
                        .with_fix(fix),
                    );
                }
                if let Some(found) = step.run.as_deref().and_then(|r| ctx.inline_secret.find(r)) {
                    let name = found.as_str().split('=').next().unwrap_or_default();
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} assigns an inline '{name}' value",
                            describe_step(i, step)
                        ))
                        .at_step(id, i)
                        .with_fix(fix),
                    );
                }
            }
        }
        diags
    }
}

/// Unquoted untrusted expressions interpolated into run commands.
pub(crate) struct InjectionRule;
impl LintRule for InjectionRule {
    fn name(&self) -> &str { "expression_injection" }
    fn kind(&self) -> ViolationKind { ViolationKind::Security }
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (id, job) in &ctx.workflow.jobs {
            for (i, step) in job.steps.iter().enumerate() {
                let Some(run) = step.run.as_deref() else {
                    continue;
                };
                if let Some(context) = unquoted_untrusted(run, &ctx.policy.untrusted_contexts) {
                    diags.push(
                        self.violation(format!(
                            "Job '{id}' {} interpolates untrusted '{context}' without quotes",
                            describe_step(i, step)
                        ))
                        .at_step(id, i)
                        .with_fix("Pass the value through `env:` or wrap the expression in quotes"),
                    );
                }
            }
        }
        diags
    }
}

/// First untrusted context referenced by an expression that is not
/// immediately preceded by a quote character.
fn unquoted_untrusted<'a>(run: &str, contexts: &'a [String]) -> Option<&'a str> {
    for (start, _) in run.match_indices(EXPRESSION_OPEN) {
        let body = run[start + EXPRESSION_OPEN.len()..].trim_start();
        let Some(context) = contexts.iter().find(|c| body.starts_with(c.as_str())) else {
            continue;
        };
        let quoted = run[..start].ends_with(['"', '\'']);
        if !quoted {
            return Some(context.as_str());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn with_step(step: &str) -> Workflow {
        parse(&format!(
            "name: t\non: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - {step}\n"
        ))
        .unwrap()
    }

    #[test]
    fn action_reference_shapes() {
        for ok in ["actions/checkout@v4", "./local/action", "docker://alpine:3", "owner/repo"] {
            assert!(run(&ActionReferenceRule, &with_step(&format!("uses: {ok}"))).is_empty(), "{ok}");
        }
        let diags = run(&ActionReferenceRule, &with_step("uses: checkout@v4"));
        assert!(diags[0].message.contains("expected owner/repo"));
        let diags = run(&ActionReferenceRule, &with_step("uses: ./../escape"));
        assert!(diags[0].message.contains("path traversal"));
    }

    #[test]
    fn dangerous_commands_are_rejected() {
        for cmd in ["sudo rm -rf build", "rm -rf /", "mkfs.ext4 /dev/sda", "dd if=/dev/zero of=/dev/sda"] {
            let diags = run(&RunCommandRule, &with_step(&format!("run: {cmd}")));
            assert_eq!(diags.len(), 1, "{cmd}");
        }
        assert!(run(&RunCommandRule, &with_step("run: rm -rf target")).is_empty());
    }

    #[test]
    fn piped_download_needs_all_three_markers() {
        assert_eq!(run(&RunCommandRule, &with_step("run: curl https://x | bash")).len(), 1);
        assert!(run(&RunCommandRule, &with_step("run: curl -o x.sh https://x && bash x.sh")).is_empty());
        assert!(run(&RunCommandRule, &with_step("run: curl https://x | sh")).is_empty());
    }

    #[test]
    fn permission_vocabulary() {
        let wf = parse("permissions:\n  contents: read\n  id-token: write\njobs:\n  a:\n    permissions:\n      issues: admin\n").unwrap();
        let diags = run(&PermissionsRule, &wf);
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message.contains("unknown permission 'id-token'"));
        assert!(diags[1].message.contains("'issues' level 'admin'"));
        assert_eq!(diags[1].job.as_deref(), Some("a"));
    }

    #[test]
    fn env_secrets_require_a_reference() {
        let wf = parse("jobs:\n  a:\n    env:\n      API_KEY: sk_live_abcdef1234567890\n      GH_TOKEN: ${{ secrets.GH_TOKEN }}\n      DEPLOY_AUTH: $DEPLOY\n      GITHUB_TOKEN: \"\"\n      MODE: release\n    steps:\n      - run: echo\n        env:\n          DB_Password: hunter2\n").unwrap();
        let diags = run(&HardcodedSecretRule, &wf);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages[0].contains("'API_KEY'"));
        assert!(messages[1].contains("'DEPLOY_AUTH'"));
        assert!(messages[2].contains("'DB_Password'"));
        assert_eq!(diags[2].step, Some(0));
    }

    #[test]
    fn inline_secret_pattern_in_run() {
        let diags = run(&HardcodedSecretRule, &with_step("run: ./deploy --token=abcdefghij12345"));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("inline 'token' value"));
        assert!(run(&HardcodedSecretRule, &with_step("run: ./deploy token=short")).is_empty());
        assert!(run(&HardcodedSecretRule, &with_step("run: ./deploy TOKEN=abcdefghij12345")).is_empty());
    }

    #[test]
    fn injection_requires_quotes() {
        let bad = with_step("run: echo ${{ github.event.issue.title }}");
        let diags = run(&InjectionRule, &bad);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'github.event'"));

        assert!(run(&InjectionRule, &with_step(r#"run: echo "${{ github.event.issue.title }}""#)).is_empty());
        assert!(run(&InjectionRule, &with_step("run: echo ${{ github.sha }}")).is_empty());
    }

    #[test]
    fn injection_checks_each_occurrence() {
        let run_text = r#"echo "${{ github.head_ref }}" && git checkout ${{ github.head_ref }}"#;
        let contexts = Policy::default().untrusted_contexts;
        assert_eq!(unquoted_untrusted(run_text, &contexts), Some("github.head_ref"));
        assert_eq!(unquoted_untrusted("echo '${{github.event.pull_request.title}}'", &contexts), None);
        assert_eq!(unquoted_untrusted("echo ${{github.event.pull_request.title}}", &contexts), Some("github.event"));
    }
}
