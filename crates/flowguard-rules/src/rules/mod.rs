//! Built-in lint rules, one module per rule group.

mod advisory;
mod resources;
mod security;
mod structural;

use flowguard_parse::Step;

use crate::policy::Policy;
use crate::validation::LintRule;

/// Rules in evaluation order: structural, security, resource limits, advisory.
pub(crate) fn built_in(policy: &Policy) -> Vec<Box<dyn LintRule>> {
    let mut rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(structural::WorkflowNameRule),
        Box::new(structural::TriggersRule),
        Box::new(structural::JobsPresentRule),
        Box::new(structural::JobShapeRule),
        Box::new(structural::NeedsRule),
    ];
    if policy.detect_dependency_cycles {
        rules.push(Box::new(structural::DependencyCycleRule));
    }
    rules.extend([
        Box::new(security::ActionReferenceRule) as Box<dyn LintRule>,
        Box::new(security::RunCommandRule),
        Box::new(security::PermissionsRule),
        Box::new(security::HardcodedSecretRule),
        Box::new(security::InjectionRule),
        Box::new(resources::ResourceLimitsRule),
        Box::new(advisory::ActionPinningRule),
        Box::new(advisory::CachingRule),
        Box::new(advisory::ArtifactRetentionRule),
    ]);
    rules
}

/// `step 2 ('Build')`, using the first line of the step label.
pub(crate) fn describe_step(index: usize, step: &Step) -> String {
    let label = step.label().lines().next().unwrap_or_default().trim();
    format!("step {} ('{}')", index + 1, label)
}
