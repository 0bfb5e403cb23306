//! Workflow validation: lint rules, diagnostics and the rule pipeline.
//!
//! Rules run in four groups: structural, security, resource limits and
//! advisory. [`Validator::validate`] stops at the first `Error`-severity
//! diagnostic and turns it into the matching [`FlowguardError`];
//! [`Validator::lint`] runs every rule and returns everything it found.

use regex::Regex;
use serde::Serialize;

use flowguard_parse::Workflow;
use flowguard_types::{FlowguardError, Result, ViolationKind};

use crate::policy::Policy;
use crate::rules;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub rule: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    /// 0-based index into the job's steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

impl Diagnostic {
    pub fn new(
        rule: &str,
        kind: ViolationKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.to_string(),
            kind,
            severity,
            message: message.into(),
            job: None,
            step: None,
            fix: None,
        }
    }

    pub fn error(rule: &str, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self::new(rule, kind, Severity::Error, message)
    }

    pub fn in_job(mut self, job: &str) -> Self {
        self.job = Some(job.to_string());
        self
    }

    pub fn at_step(mut self, job: &str, index: usize) -> Self {
        self.job = Some(job.to_string());
        self.step = Some(index);
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Convert into the rejection error for this diagnostic's group.
    pub fn into_error(self) -> FlowguardError {
        FlowguardError::violation(self.kind, self.rule, self.message)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.rule, self.message)?;
        if let Some(fix) = &self.fix {
            write!(f, " (fix: {fix})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    pub workflow: &'a Workflow,
    pub policy: &'a Policy,
    /// Compiled `policy.inline_secret_pattern`.
    pub inline_secret: &'a Regex,
}

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ViolationKind;
    fn apply(&self, ctx: &RuleContext<'_>) -> Vec<Diagnostic>;

    /// Error diagnostic attributed to this rule.
    fn violation(&self, message: String) -> Diagnostic {
        Diagnostic::error(self.name(), self.kind(), message)
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A policy together with its compiled pattern and ordered rule list.
pub struct Validator {
    policy: Policy,
    inline_secret: Regex,
    rules: Vec<Box<dyn LintRule>>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("policy", &self.policy)
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl Validator {
    pub fn new(policy: Policy) -> Result<Self> {
        let inline_secret = Regex::new(&policy.inline_secret_pattern).map_err(|e| {
            FlowguardError::InvalidPolicy(format!("inline_secret_pattern: {e}"))
        })?;
        if policy.permission_levels.is_empty() {
            return Err(FlowguardError::InvalidPolicy(
                "permission_levels must not be empty".into(),
            ));
        }
        let rules = rules::built_in(&policy);
        Ok(Self {
            policy,
            inline_secret,
            rules,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    fn context<'a>(&'a self, workflow: &'a Workflow) -> RuleContext<'a> {
        RuleContext {
            workflow,
            policy: &self.policy,
            inline_secret: &self.inline_secret,
        }
    }

    /// Run all rules and return every diagnostic, errors first within each
    /// rule's output order.
    pub fn lint(&self, workflow: &Workflow) -> Vec<Diagnostic> {
        let ctx = self.context(workflow);
        self.rules.iter().flat_map(|rule| rule.apply(&ctx)).collect()
    }

    /// Run the rules in order and reject on the first error. Warnings and
    /// informational findings seen before acceptance are returned.
    pub fn validate(&self, workflow: &Workflow) -> Result<Vec<Diagnostic>> {
        let ctx = self.context(workflow);
        let mut findings = Vec::new();
        for rule in &self.rules {
            for diag in rule.apply(&ctx) {
                if diag.is_error() {
                    tracing::debug!(rule = %diag.rule, kind = %diag.kind, "Workflow rejected");
                    return Err(diag.into_error());
                }
                findings.push(diag);
            }
        }
        tracing::debug!(findings = findings.len(), "Workflow accepted");
        Ok(findings)
    }
}

impl Default for Validator {
    /// The GitHub Actions preset. Its inline secret pattern is a literal
    /// known to compile, so this is the one constructor that may panic.
    fn default() -> Self {
        Self::new(Policy::github_actions()).expect("built-in policy compiles")
    }
}
