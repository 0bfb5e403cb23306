use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use flowguard_types::{FlowguardError, Result};

use crate::ast::*;
use crate::cursor::{indent_width, Line, LineCursor};

/// Tab weight used by the GitHub Actions document family.
pub const GITHUB_ACTIONS_TAB_WIDTH: usize = 2;

/// Parser tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Number of columns a tab contributes to a line's indentation.
    pub tab_width: usize,
}

impl ParserConfig {
    pub fn github_actions() -> Self {
        Self {
            tab_width: GITHUB_ACTIONS_TAB_WIDTH,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::github_actions()
    }
}

/// Parse a workflow document with the default configuration.
pub fn parse(source: &str) -> Result<Workflow> {
    parse_with(source, &ParserConfig::default())
}

/// Parse a workflow document.
///
/// Only shapes the model cannot represent are errors; a document missing
/// its name, triggers or jobs parses fine and is left to validation.
pub fn parse_with(source: &str, config: &ParserConfig) -> Result<Workflow> {
    let mut parser = Parser {
        cursor: LineCursor::new(source, config.tab_width),
        tab_width: config.tab_width,
    };
    let workflow = parser.workflow()?;
    tracing::debug!(
        name = %workflow.name,
        triggers = workflow.on.len(),
        jobs = workflow.jobs.len(),
        "Parsed workflow"
    );
    Ok(workflow)
}

struct Parser<'a> {
    cursor: LineCursor<'a>,
    tab_width: usize,
}

impl<'a> Parser<'a> {
    fn workflow(&mut self) -> Result<Workflow> {
        let mut workflow = Workflow::default();
        while let Some(line) = self.cursor.next_line() {
            let Some((key, value)) = split_entry(line.text) else {
                self.skip_nested(line);
                continue;
            };
            match key {
                "name" => workflow.name = value,
                "on" => self.triggers(line, &value, &mut workflow.on),
                "permissions" => self.mapping(line, &value, &mut workflow.permissions),
                "jobs" => self.jobs(line, &mut workflow.jobs)?,
                "env" => self.mapping(line, &value, &mut workflow.env),
                other => {
                    tracing::trace!(key = other, line = line.number, "Skipping top-level key");
                    self.skip_nested(line);
                }
            }
        }
        Ok(workflow)
    }

    /// `on:` as a scalar, a flow list, a block list, or a mapping of events.
    /// Lines nested under an event become that event's raw value.
    fn triggers(&mut self, header: Line<'a>, inline: &str, on: &mut StringMap) {
        if !inline.is_empty() {
            for event in inline_list(inline) {
                on.insert(event, String::new());
            }
        }

        let mut event_indent = None;
        let mut current: Option<String> = None;
        while let Some(line) = self.cursor.next_line() {
            if ends_block(&line, &header) {
                self.cursor.unread();
                break;
            }
            let level = *event_indent.get_or_insert(line.indent);
            if line.indent > level {
                if let Some(raw) = current.as_ref().and_then(|event| on.get_mut(event)) {
                    if !raw.is_empty() {
                        raw.push('\n');
                    }
                    raw.push_str(line.text);
                }
                continue;
            }

            let (event, value) = if line.is_item() {
                (clean_value(item_content(line.text)), String::new())
            } else {
                match split_entry(line.text) {
                    Some((key, value)) => (key.to_string(), value),
                    None => (clean_value(line.text), String::new()),
                }
            };
            if event.is_empty() {
                continue;
            }
            on.insert(event.clone(), value);
            current = Some(event);
        }
    }

    /// Flat `key: value` mapping shared by `permissions`, `env` and `with`.
    fn mapping(&mut self, header: Line<'a>, inline: &str, map: &mut StringMap) {
        match flow_map(inline) {
            Some(pairs) => map.extend(pairs),
            None if !inline.is_empty() => {
                tracing::debug!(
                    line = header.number,
                    value = inline,
                    "Ignoring inline scalar where a mapping was expected"
                );
            }
            None => {}
        }

        let mut entry_indent = None;
        while let Some(line) = self.cursor.next_line() {
            if ends_block(&line, &header) {
                self.cursor.unread();
                break;
            }
            let level = *entry_indent.get_or_insert(line.indent);
            if line.indent > level {
                // nested values cannot be represented in a flat map
                continue;
            }
            if let Some((key, value)) = split_entry(line.text) {
                map.insert(key.to_string(), value);
            }
        }
    }

    fn jobs(&mut self, header: Line<'a>, jobs: &mut BTreeMap<String, Job>) -> Result<()> {
        while let Some(line) = self.cursor.next_line() {
            if line.indent <= header.indent {
                self.cursor.unread();
                break;
            }
            match split_entry(line.text) {
                Some((id, _)) => {
                    let job = self.job(line)?;
                    tracing::trace!(job = id, steps = job.steps.len(), "Parsed job");
                    jobs.insert(id.to_string(), job);
                }
                None => self.skip_nested(line),
            }
        }
        Ok(())
    }

    fn job(&mut self, header: Line<'a>) -> Result<Job> {
        let mut job = Job::default();
        let mut field_indent = None;
        while let Some(line) = self.cursor.next_line() {
            if line.indent <= header.indent {
                self.cursor.unread();
                break;
            }
            let level = *field_indent.get_or_insert(line.indent);
            if line.indent > level {
                continue;
            }
            let Some((key, value)) = split_entry(line.text) else {
                self.skip_nested(line);
                continue;
            };
            match key {
                "name" => job.name = non_empty(value),
                "runs-on" => {
                    job.runs_on = if value.is_empty() {
                        self.items(line).join(", ")
                    } else {
                        value
                    }
                }
                "timeout-minutes" => job.timeout_minutes = parse_int(key, &value, &line)?,
                "if" => job.if_condition = non_empty(self.scalar(line, value)),
                "needs" => {
                    job.needs = if value.is_empty() {
                        self.items(line)
                    } else {
                        inline_list(&value)
                    }
                }
                "permissions" => self.mapping(line, &value, &mut job.permissions),
                "env" => self.mapping(line, &value, &mut job.env),
                "steps" => job.steps = self.steps(line),
                other => {
                    tracing::trace!(key = other, line = line.number, "Skipping job key");
                    self.skip_nested(line);
                }
            }
        }
        Ok(job)
    }

    /// Dash-prefixed scalar items under `header`.
    fn items(&mut self, header: Line<'a>) -> Vec<String> {
        let mut items = Vec::new();
        while let Some(line) = self.cursor.next_line() {
            if ends_block(&line, &header) {
                self.cursor.unread();
                break;
            }
            if line.is_item() {
                let item = clean_value(item_content(line.text));
                if !item.is_empty() {
                    items.push(item);
                }
            }
        }
        items
    }

    fn steps(&mut self, header: Line<'a>) -> Vec<Step> {
        let mut steps = Vec::new();
        while let Some(line) = self.cursor.next_line() {
            if ends_block(&line, &header) {
                self.cursor.unread();
                break;
            }
            if line.is_item() {
                steps.push(self.step(line));
            } else {
                self.skip_nested(line);
            }
        }
        steps
    }

    fn step(&mut self, dash: Line<'a>) -> Step {
        let mut step = Step::default();
        let mut field_indent = None;

        let content = item_content(dash.text);
        if !content.is_empty() {
            let first = Line {
                number: dash.number,
                indent: dash.indent + 1 + indent_width(&dash.text[1..], self.tab_width),
                text: content,
            };
            field_indent = Some(first.indent);
            self.step_field(&mut step, first);
        }

        while let Some(line) = self.cursor.next_line() {
            if line.indent <= dash.indent {
                self.cursor.unread();
                break;
            }
            let level = *field_indent.get_or_insert(line.indent);
            if line.indent > level {
                continue;
            }
            self.step_field(&mut step, line);
        }
        step
    }

    fn step_field(&mut self, step: &mut Step, line: Line<'a>) {
        let Some((key, value)) = split_entry(line.text) else {
            self.skip_nested(line);
            return;
        };
        match key {
            "name" => step.name = non_empty(value),
            "uses" => step.uses = non_empty(value),
            "run" => step.run = non_empty(self.scalar(line, value)),
            "if" => step.if_condition = non_empty(self.scalar(line, value)),
            "with" => self.mapping(line, &value, &mut step.with),
            "env" => self.mapping(line, &value, &mut step.env),
            other => {
                tracing::trace!(key = other, line = line.number, "Skipping step key");
                self.skip_nested(line);
            }
        }
    }

    /// Resolve a field value, reading the following block when the value is
    /// a `|` or `>` block indicator.
    fn scalar(&mut self, line: Line<'a>, value: String) -> String {
        match block_style(&value) {
            Some(folded) => self.block_scalar(line, folded),
            None => value,
        }
    }

    fn block_scalar(&mut self, header: Line<'a>, folded: bool) -> String {
        let mut lines: Vec<Line<'a>> = Vec::new();
        while let Some(line) = self.cursor.next_raw() {
            if !line.is_blank() && line.indent <= header.indent {
                self.cursor.unread();
                break;
            }
            lines.push(line);
        }
        while lines.last().is_some_and(|l| l.is_blank()) {
            lines.pop();
        }

        let base = lines
            .iter()
            .filter(|l| !l.is_blank())
            .map(|l| l.indent)
            .min()
            .unwrap_or(0);
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| {
                if l.is_blank() {
                    String::new()
                } else {
                    format!("{}{}", " ".repeat(l.indent - base), l.text)
                }
            })
            .collect();

        let mut out = String::new();
        for (i, text) in rendered.iter().enumerate() {
            if i > 0 {
                let joins_paragraph = folded && !text.is_empty() && !rendered[i - 1].is_empty();
                out.push(if joins_paragraph { ' ' } else { '\n' });
            }
            out.push_str(text);
        }
        out
    }

    /// Consume every line nested deeper than `header`.
    fn skip_nested(&mut self, header: Line<'a>) {
        while self.cursor.peek().is_some_and(|line| line.indent > header.indent) {
            self.cursor.next_line();
        }
    }
}

/// A line closes the block opened by `header` when it is shallower, or at the
/// same depth without being a sequence item (`key:\n- item` is legal).
fn ends_block(line: &Line<'_>, header: &Line<'_>) -> bool {
    line.indent < header.indent || (line.indent == header.indent && !line.is_item())
}

fn item_content(text: &str) -> &str {
    text.strip_prefix('-').unwrap_or(text).trim_start()
}

/// Split `key: value` at the first colon.
fn split_entry(text: &str) -> Option<(&str, String)> {
    let colon = text.find(':')?;
    let key = unquote(text[..colon].trim());
    if key.is_empty() {
        return None;
    }
    Some((key, clean_value(&text[colon + 1..])))
}

/// Trim, strip one layer of matching quotes, and drop a trailing ` #` comment
/// from unquoted values.
fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    if value.starts_with('#') {
        return String::new();
    }
    if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
        if let Some(end) = value[1..].rfind(quote).map(|i| i + 1) {
            let rest = value[end + 1..].trim();
            if rest.is_empty() || rest.starts_with('#') {
                return value[1..end].to_string();
            }
        }
        return value.to_string();
    }
    match value.find(" #") {
        Some(i) => value[..i].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Split the body of a flow collection on commas outside nested brackets.
fn split_flow(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn flow_list(value: &str) -> Option<Vec<String>> {
    let body = value.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        split_flow(body)
            .into_iter()
            .map(clean_value)
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

fn flow_map(value: &str) -> Option<Vec<(String, String)>> {
    let body = value.strip_prefix('{')?.strip_suffix('}')?;
    Some(
        split_flow(body)
            .into_iter()
            .filter_map(|item| split_entry(item.trim()))
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

/// Names from an inline value: `[a, b]`, `{a: .., b: ..}`, or a bare scalar.
fn inline_list(value: &str) -> Vec<String> {
    if let Some(items) = flow_list(value) {
        return items;
    }
    if let Some(pairs) = flow_map(value) {
        return pairs.into_iter().map(|(key, _)| key).collect();
    }
    vec![value.to_string()]
}

/// `Some(folded)` for `|`/`>` block indicators with optional chomping and
/// indentation hints.
fn block_style(value: &str) -> Option<bool> {
    let mut chars = value.chars();
    let folded = match chars.next()? {
        '|' => false,
        '>' => true,
        _ => return None,
    };
    chars
        .all(|c| c == '-' || c == '+' || c.is_ascii_digit())
        .then_some(folded)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn parse_int(key: &str, value: &str, line: &Line<'_>) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| FlowguardError::Syntax {
        line: line.number,
        message: format!("{key} is not an integer: '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_value_strips_one_layer_of_quotes() {
        assert_eq!(clean_value(r#" "hello" "#), "hello");
        assert_eq!(clean_value("'a b'"), "a b");
        assert_eq!(clean_value(r#""'nested'""#), "'nested'");
        assert_eq!(clean_value(r#""unterminated"#), r#""unterminated"#);
    }

    #[test]
    fn clean_value_drops_trailing_comments() {
        assert_eq!(clean_value("actions/checkout@v4 # v4.1.1"), "actions/checkout@v4");
        assert_eq!(clean_value(r#""a#b" # note"#), "a#b");
        assert_eq!(clean_value("# only a comment"), "");
        assert_eq!(clean_value("echo a#b"), "echo a#b");
    }

    #[test]
    fn split_entry_uses_first_colon() {
        let (key, value) = split_entry("uses: docker://alpine:3.19").unwrap();
        assert_eq!(key, "uses");
        assert_eq!(value, "docker://alpine:3.19");
        assert!(split_entry("echo hi").is_none());
        assert!(split_entry(": value").is_none());
        assert_eq!(split_entry("'on': push").map(|(k, _)| k), Some("on"));
    }

    #[test]
    fn inline_lists() {
        assert_eq!(inline_list("[a, 'b', c]"), vec!["a", "b", "c"]);
        assert_eq!(inline_list("build"), vec!["build"]);
        assert_eq!(inline_list("{push: {branches: [main]}, pull_request: {}}"), vec!["push", "pull_request"]);
        assert!(inline_list("[]").is_empty());
    }

    #[test]
    fn block_indicators() {
        assert_eq!(block_style("|"), Some(false));
        assert_eq!(block_style("|-"), Some(false));
        assert_eq!(block_style(">+2"), Some(true));
        assert_eq!(block_style("|x"), None);
        assert_eq!(block_style("echo"), None);
        assert_eq!(block_style(""), None);
    }

    #[test]
    fn parse_int_reports_line() {
        let line = Line {
            number: 9,
            indent: 4,
            text: "timeout-minutes: soon",
        };
        let err = parse_int("timeout-minutes", "soon", &line).unwrap_err();
        assert!(matches!(err, FlowguardError::Syntax { line: 9, .. }));
        assert_eq!(parse_int("timeout-minutes", " -5 ", &line).unwrap(), -5);
    }
}
