//! Byte-level entry points: size gate, decode, parse, validate.

use std::borrow::Cow;

use serde::Serialize;

use flowguard_parse::{parse_with, ParserConfig, Workflow};
use flowguard_types::{FlowguardError, Result};

use crate::validation::{Diagnostic, Validator};

/// Inputs larger than this are rejected without parsing.
pub const MAX_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub parser: ParserConfig,
    pub max_input_bytes: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            parser: ParserConfig::github_actions(),
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }
}

/// Summary of a parsed document and the findings that did not reject it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub workflow: String,
    pub jobs: usize,
    pub steps: usize,
    /// Non-fatal findings (warnings, informational), or every finding when
    /// produced by [`lint_source`].
    pub findings: Vec<Diagnostic>,
}

impl Report {
    fn new(workflow: &Workflow, findings: Vec<Diagnostic>) -> Self {
        Self {
            workflow: workflow.name.clone(),
            jobs: workflow.jobs.len(),
            steps: workflow.step_count(),
            findings,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Diagnostic::is_error)
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_VALIDATOR: Validator = Validator::default();
}

/// Boolean verdict with the GitHub Actions preset: `true` only when the
/// input is within size bounds, parses, and passes every rule.
pub fn accepts(data: &[u8]) -> bool {
    check_bytes(data, &CheckOptions::default(), &DEFAULT_VALIDATOR).is_ok()
}

fn decode<'a>(data: &'a [u8], options: &CheckOptions) -> Result<Cow<'a, str>> {
    if data.is_empty() || data.len() > options.max_input_bytes {
        return Err(FlowguardError::InputSize {
            size: data.len(),
            limit: options.max_input_bytes,
        });
    }
    Ok(String::from_utf8_lossy(data))
}

/// Reject empty or oversized input, decode lossily, then [`check_source`].
pub fn check_bytes(data: &[u8], options: &CheckOptions, validator: &Validator) -> Result<Report> {
    check_source(&decode(data, options)?, options, validator)
}

/// Byte-level counterpart of [`lint_source`], with the same size gate as
/// [`check_bytes`].
pub fn lint_bytes(data: &[u8], options: &CheckOptions, validator: &Validator) -> Result<Report> {
    lint_source(&decode(data, options)?, options, validator)
}

/// Parse and fail-fast validate a document.
pub fn check_source(source: &str, options: &CheckOptions, validator: &Validator) -> Result<Report> {
    let workflow = parse_with(source, &options.parser)?;
    let findings = validator.validate(&workflow)?;
    Ok(Report::new(&workflow, findings))
}

/// Parse and collect every finding. Only a syntax error fails the call.
pub fn lint_source(source: &str, options: &CheckOptions, validator: &Validator) -> Result<Report> {
    let workflow = parse_with(source, &options.parser)?;
    let findings = validator.lint(&workflow);
    Ok(Report::new(&workflow, findings))
}
