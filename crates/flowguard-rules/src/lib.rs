//! Security and policy validation for parsed CI workflows.
//!
//! A [`Validator`] pairs a [`Policy`] with the built-in rule set. Rules run
//! in four groups (structural, security, resource limits, advisory) and
//! produce [`Diagnostic`]s; `validate` rejects on the first error while
//! `lint` collects everything.
//!
//! # Example
//! ```
//! use flowguard_rules::{accepts, check_source, CheckOptions, Validator};
//!
//! let source = "name: CI\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hi\n";
//! assert!(accepts(source.as_bytes()));
//!
//! let report = check_source(source, &CheckOptions::default(), &Validator::default()).unwrap();
//! assert_eq!(report.jobs, 1);
//! ```

pub mod check;
pub mod policy;
mod rules;
pub mod validation;

pub use check::{accepts, check_bytes, check_source, lint_bytes, lint_source, CheckOptions, Report, MAX_INPUT_BYTES};
pub use policy::{Limits, Policy, DEFAULT_INLINE_SECRET_PATTERN};
pub use validation::{Diagnostic, LintRule, RuleContext, Severity, Validator};
