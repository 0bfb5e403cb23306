//! Indentation-sensitive parser for CI workflow definitions.
//!
//! Reads the GitHub-Actions-style subset (`name`, `on`, `permissions`, `env`,
//! `jobs` with steps) into a typed model: [`Workflow`], [`Job`], [`Step`].
//! There is no grammar; each section is consumed by a dedicated sub-parser
//! working on a [`LineCursor`] until the indentation drops back.
//!
//! # Example
//! ```
//! let source = "name: CI\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hi\n";
//! let workflow = flowguard_parse::parse(source).unwrap();
//! assert_eq!(workflow.name, "CI");
//! assert_eq!(workflow.jobs["build"].steps.len(), 1);
//! ```

pub mod ast;
pub mod cursor;
mod parser;

pub use ast::*;
pub use cursor::{Line, LineCursor};
pub use parser::{parse, parse_with, ParserConfig, GITHUB_ACTIONS_TAB_WIDTH};

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_types::FlowguardError;

    const FULL: &str = r#"# CI pipeline
name: "Build and Test"

on:
  push:
    branches: [main]
  pull_request:

permissions:
  contents: read
  pull-requests: write

env:
  CARGO_TERM_COLOR: always

jobs:
  build:
    name: Build
    runs-on: ubuntu-latest
    timeout-minutes: 30
    permissions:
      contents: read
    env:
      RUST_LOG: debug
    steps:
      - name: Checkout
        uses: actions/checkout@v4
      - name: Build
        run: cargo build --release
        env:
          PROFILE: release
      - uses: actions/upload-artifact@v4
        with:
          name: binary
          retention-days: 5

  test:
    runs-on: windows-latest
    needs: build
    if: github.event_name == 'push'
    steps:
      - run: |
          cargo test
          cargo test --doc
"#;

    #[test]
    fn parse_full_workflow() {
        let wf = parse(FULL).unwrap();
        assert_eq!(wf.name, "Build and Test");
        assert_eq!(wf.on.len(), 2);
        assert_eq!(wf.on["push"], "branches: [main]");
        assert_eq!(wf.on["pull_request"], "");
        assert_eq!(wf.permissions.get("contents").map(String::as_str), Some("read"));
        assert_eq!(wf.permissions.get("pull-requests").map(String::as_str), Some("write"));
        assert_eq!(wf.env["CARGO_TERM_COLOR"], "always");
        assert_eq!(wf.jobs.len(), 2);
    }

    #[test]
    fn parse_job_fields() {
        let wf = parse(FULL).unwrap();
        let build = wf.job("build").unwrap();
        assert_eq!(build.name.as_deref(), Some("Build"));
        assert_eq!(build.runs_on, "ubuntu-latest");
        assert_eq!(build.timeout_minutes, 30);
        assert_eq!(build.permissions["contents"], "read");
        assert_eq!(build.env["RUST_LOG"], "debug");
        assert_eq!(build.steps.len(), 3);
        assert!(build.needs.is_empty());

        let test = wf.job("test").unwrap();
        assert_eq!(test.runs_on, "windows-latest");
        assert_eq!(test.needs, vec!["build"]);
        assert_eq!(test.timeout_minutes, DEFAULT_TIMEOUT_MINUTES);
        assert_eq!(test.if_condition.as_deref(), Some("github.event_name == 'push'"));
    }

    #[test]
    fn parse_step_fields() {
        let wf = parse(FULL).unwrap();
        let steps = &wf.jobs["build"].steps;
        assert_eq!(steps[0].name.as_deref(), Some("Checkout"));
        assert_eq!(steps[0].uses.as_deref(), Some("actions/checkout@v4"));
        assert_eq!(steps[0].run, None);
        assert_eq!(steps[1].run.as_deref(), Some("cargo build --release"));
        assert_eq!(steps[1].env["PROFILE"], "release");
        assert_eq!(steps[2].with["name"], "binary");
        assert_eq!(steps[2].with["retention-days"], "5");
    }

    #[test]
    fn parse_block_scalar_run() {
        let wf = parse(FULL).unwrap();
        let run = wf.jobs["test"].steps[0].run.as_deref();
        assert_eq!(run, Some("cargo test\ncargo test --doc"));
    }

    #[test]
    fn folded_block_scalar_joins_lines() {
        let src = "jobs:\n  a:\n    steps:\n      - run: >-\n          echo one\n          two\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.jobs["a"].steps[0].run.as_deref(), Some("echo one two"));
    }

    #[test]
    fn block_scalar_keeps_inner_comments_and_indentation() {
        let src = "jobs:\n  a:\n    steps:\n      - run: |\n          # setup\n          if true; then\n            echo yes\n          fi\n      - run: echo next\n";
        let wf = parse(src).unwrap();
        let steps = &wf.jobs["a"].steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps[0].run.as_deref(),
            Some("# setup\nif true; then\n  echo yes\nfi")
        );
        assert_eq!(steps[1].run.as_deref(), Some("echo next"));
    }

    #[test]
    fn inline_trigger_forms() {
        let wf = parse("on: push\n").unwrap();
        assert_eq!(wf.on.keys().collect::<Vec<_>>(), vec!["push"]);

        let wf = parse("on: [push, pull_request]\n").unwrap();
        assert_eq!(wf.on.len(), 2);
        assert!(wf.on.contains_key("pull_request"));

        let wf = parse("on:\n  - push\n  - workflow_dispatch\n").unwrap();
        assert_eq!(wf.on.len(), 2);
        assert!(wf.on.contains_key("workflow_dispatch"));
    }

    #[test]
    fn needs_forms() {
        let src = "jobs:\n  a:\n    needs: [b, 'c']\n  d:\n    needs:\n      - a\n      - b\n  e:\n    needs: a\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.jobs["a"].needs, vec!["b", "c"]);
        assert_eq!(wf.jobs["d"].needs, vec!["a", "b"]);
        assert_eq!(wf.jobs["e"].needs, vec!["a"]);
    }

    #[test]
    fn sequence_at_same_indent_as_key() {
        let src = "jobs:\n  a:\n    steps:\n    - run: one\n    - uses: actions/cache@v4\n      with:\n        path: target\n    timeout-minutes: 10\n";
        let wf = parse(src).unwrap();
        let job = &wf.jobs["a"];
        assert_eq!(job.steps.len(), 2);
        assert_eq!(job.steps[1].with["path"], "target");
        assert_eq!(job.timeout_minutes, 10);
    }

    #[test]
    fn unknown_keys_skip_their_nested_block() {
        let src = "jobs:\n  a:\n    strategy:\n      matrix:\n        name: [x, y]\n        runs-on: nope\n    runs-on: ubuntu-22.04\n    steps:\n      - run: echo\n        shell: bash\n        with-extra:\n          uses: fake\n";
        let wf = parse(src).unwrap();
        let job = &wf.jobs["a"];
        assert_eq!(job.name, None);
        assert_eq!(job.runs_on, "ubuntu-22.04");
        assert_eq!(job.steps[0].uses, None);
    }

    #[test]
    fn runs_on_list_is_kept_as_text() {
        let wf = parse("jobs:\n  a:\n    runs-on: [self-hosted, linux]\n").unwrap();
        assert_eq!(wf.jobs["a"].runs_on, "[self-hosted, linux]");

        let wf = parse("jobs:\n  a:\n    runs-on:\n      - self-hosted\n      - gpu\n").unwrap();
        assert_eq!(wf.jobs["a"].runs_on, "self-hosted, gpu");
    }

    #[test]
    fn non_numeric_timeout_is_syntax_error() {
        let src = "name: x\njobs:\n  a:\n    timeout-minutes: soon\n";
        let err = parse(src).unwrap_err();
        match err {
            FlowguardError::Syntax { line, message } => {
                assert_eq!(line, 4);
                assert!(message.contains("timeout-minutes"));
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn negative_timeout_parses() {
        let wf = parse("jobs:\n  a:\n    timeout-minutes: -3\n").unwrap();
        assert_eq!(wf.jobs["a"].timeout_minutes, -3);
    }

    #[test]
    fn empty_document_parses_to_empty_workflow() {
        assert_eq!(parse("").unwrap(), Workflow::default());
        assert_eq!(parse("\n# only comments\n\n").unwrap(), Workflow::default());
    }

    #[test]
    fn duplicate_job_keeps_last_definition() {
        let src = "jobs:\n  a:\n    runs-on: first\n  a:\n    runs-on: second\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.jobs.len(), 1);
        assert_eq!(wf.jobs["a"].runs_on, "second");
    }

    #[test]
    fn tabs_count_as_configured_width() {
        let src = "jobs:\n\tbuild:\n\t\truns-on: ubuntu-latest\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.jobs["build"].runs_on, "ubuntu-latest");

        let config = ParserConfig { tab_width: 4 };
        let wf = parse_with("jobs:\n\ta:\n  \t  runs-on: macos-14\n", &config).unwrap();
        assert_eq!(wf.jobs["a"].runs_on, "macos-14");
    }

    #[test]
    fn tab_after_step_dash_uses_configured_width() {
        let config = ParserConfig { tab_width: 4 };
        let src = "jobs:\n  a:\n    steps:\n      -\tname: build\n           run: make\n";
        let wf = parse_with(src, &config).unwrap();
        let step = &wf.jobs["a"].steps[0];
        assert_eq!(step.name.as_deref(), Some("build"));
        assert_eq!(step.run.as_deref(), Some("make"));
    }

    #[test]
    fn flow_mappings_inline() {
        let src = "env: {A: one, B: 'two'}\npermissions: read-all\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.env["A"], "one");
        assert_eq!(wf.env["B"], "two");
        assert!(wf.permissions.is_empty());
    }

    #[test]
    fn top_level_sections_in_any_order() {
        let src = "jobs:\n  a:\n    runs-on: ubuntu-latest\nname: late\non: push\n";
        let wf = parse(src).unwrap();
        assert_eq!(wf.name, "late");
        assert_eq!(wf.jobs["a"].runs_on, "ubuntu-latest");
        assert!(wf.on.contains_key("push"));
    }

    #[test]
    fn step_with_both_uses_and_run_is_kept_for_validation() {
        let src = "jobs:\n  a:\n    steps:\n      - uses: actions/checkout@v4\n        run: echo\n      -\n        name: second\n";
        let wf = parse(src).unwrap();
        let steps = &wf.jobs["a"].steps;
        assert_eq!(steps.len(), 2);
        assert!(steps[0].uses.is_some() && steps[0].run.is_some());
        assert_eq!(steps[1].name.as_deref(), Some("second"));
        assert!(steps[1].uses.is_none() && steps[1].run.is_none());
    }
}
