//! FileCheck-style test validation for lift scripts.
//!
//! This module parses CHECK directives from lift scripts and validates the
//! runner output against them, similar to LLVM's FileCheck tool.

use thiserror::Error;

use super::parser::ScriptError;
use super::runner::{run_source, RunOptions};
use crate::core::ArchConfig;

/// A CHECK directive extracted from a lift script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next positive match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{0}")]
    Mismatch(String),

    #[error("unknown RUN option `{0}`")]
    UnknownOption(String),
}

/// Test specification extracted from a lift script.
#[derive(Debug)]
pub struct TestSpec {
    /// Arguments of the `; RUN:` line, if any.
    pub run_args: Vec<String>,
    pub check_directives: Vec<CheckDirective>,
    pub script: String,
}

const DIRECTIVES: [&str; 6] = ["CHECK-LABEL:", "CHECK-NEXT:", "CHECK-NOT:", "CHECK-EMPTY", "CHECK:", "COM:"];

impl TestSpec {
    /// Split a lift script into directives and script text.
    ///
    /// Directive lines are kept in the script as comments so line numbers in
    /// errors match the file.
    pub fn parse(content: &str) -> Self {
        let mut run_args = Vec::new();
        let mut check_directives = Vec::new();

        for line in content.lines() {
            let Some(comment) = line.trim().strip_prefix(';') else { continue };
            let comment = comment.trim();

            if let Some(run) = comment.strip_prefix("RUN:") {
                run_args = run.split_whitespace().map(str::to_string).collect();
                continue;
            }
            let Some(directive) = DIRECTIVES.iter().find(|d| comment.starts_with(**d)) else {
                continue;
            };
            let pattern = comment[directive.len()..].trim().to_string();
            check_directives.push(match *directive {
                "CHECK-LABEL:" => CheckDirective::CheckLabel(pattern),
                "CHECK-NEXT:" => CheckDirective::CheckNext(pattern),
                "CHECK-NOT:" => CheckDirective::CheckNot(pattern),
                "CHECK-EMPTY" => CheckDirective::CheckEmpty,
                "CHECK:" => CheckDirective::Check(pattern),
                _ => CheckDirective::Comment(pattern),
            });
        }

        TestSpec {
            run_args,
            check_directives,
            script: content.to_string(),
        }
    }

    /// Runner options selected by the RUN line: `--stats`, `--arch <name>`.
    pub fn options(&self) -> Result<RunOptions, CheckError> {
        let mut options = RunOptions::default();
        let mut args = self.run_args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--stats" => options.stats = true,
                "--arch" => {
                    let name = args.next().ok_or_else(|| CheckError::UnknownOption(arg.clone()))?;
                    options.arch =
                        Some(ArchConfig::by_name(name).ok_or_else(|| CheckError::UnknownOption(name.clone()))?);
                }
                "regtrace" | "%s" => {}
                other => return Err(CheckError::UnknownOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

/// Test runner that executes lift scripts and validates their output.
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a lift script and validate its output.
    pub fn run_test(&self, spec: &TestSpec) -> Result<String, CheckError> {
        self.run_test_with(spec, &RunOptions::default())
    }

    /// Like [`TestRunner::run_test`], with `overrides` applied on top of the
    /// options of the RUN line.
    pub fn run_test_with(&self, spec: &TestSpec, overrides: &RunOptions) -> Result<String, CheckError> {
        let options = spec.options()?.overridden_by(overrides);
        let output = run_source(&spec.script, &options)?;
        self.validate_output(&output, &spec.check_directives)?;
        Ok(output)
    }

    /// Validate output against CHECK directives.
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), CheckError> {
        let lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut forbidden: Vec<&str> = Vec::new();

        let find = |from: usize, pattern: &str| lines.iter().skip(from).position(|line| line.contains(pattern));
        let check_forbidden = |forbidden: &mut Vec<&str>, from: usize, to: usize| -> Result<(), CheckError> {
            for pattern in forbidden.drain(..) {
                if let Some(line) = lines[from..to].iter().find(|line| line.contains(pattern)) {
                    return Err(CheckError::Mismatch(format!("CHECK-NOT: '{pattern}' found in '{line}'")));
                }
            }
            Ok(())
        };

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => forbidden.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let idx = find(line_idx, pattern.as_str())
                        .ok_or_else(|| CheckError::Mismatch(format!("CHECK: pattern '{pattern}' not found in output")))?;
                    check_forbidden(&mut forbidden, line_idx, line_idx + idx)?;
                    line_idx += idx + 1;
                    if self.verbose {
                        println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = lines.get(line_idx) else {
                        return Err(CheckError::Mismatch(format!("CHECK-NEXT: no more lines, expected '{pattern}'")));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(CheckError::Mismatch(format!(
                            "CHECK-NEXT: expected '{pattern}' but got '{line}'"
                        )));
                    }
                    check_forbidden(&mut forbidden, line_idx, line_idx)?;
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if let Some(line) = lines.get(line_idx) {
                        if !line.trim().is_empty() {
                            return Err(CheckError::Mismatch(format!(
                                "CHECK-EMPTY: expected empty line but got '{line}'"
                            )));
                        }
                        line_idx += 1;
                    }
                }
            }
        }

        check_forbidden(&mut forbidden, line_idx, lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = "; RUN: regtrace --stats %s\n\
                       ; CHECK-LABEL: block entry\n\
                       ; CHECK-NEXT: read %x\n\
                       ; CHECK-NOT: pending\n\
                       ; COM: comment\n\
                       block entry\n";
        let spec = TestSpec::parse(content);
        assert_eq!(spec.run_args, vec!["regtrace", "--stats", "%s"]);
        assert_eq!(spec.check_directives.len(), 4);
        assert_eq!(spec.check_directives[2], CheckDirective::CheckNot("pending".to_string()));
        assert!(spec.options().unwrap().stats);
    }

    #[test]
    fn test_command_line_overrides_run_line() {
        let content = "; RUN: regtrace %s\n\
                       ; CHECK: stats b\n\
                       block b\n\
                       set r31:i32 = 3\n";
        let spec = TestSpec::parse(content);
        let runner = TestRunner::new(false);
        // x86-64 has no r31.
        assert!(matches!(runner.run_test(&spec), Err(CheckError::Script(_))));

        let overrides = RunOptions { arch: ArchConfig::by_name("aarch64"), stats: true };
        let output = runner.run_test_with(&spec, &overrides).unwrap();
        assert!(output.contains("Writes: 1 (0 partial)"), "{output}");
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "block entry\n  read %x = r0:i64 -> i64 %a\nir entry\n";
        let directives = vec![
            CheckDirective::CheckLabel("block entry".to_string()),
            CheckDirective::CheckNext("read %x".to_string()),
            CheckDirective::CheckNot("zext".to_string()),
            CheckDirective::Check("ir entry".to_string()),
        ];
        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";
        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNot("Line 2".to_string()),
            CheckDirective::Check("Line 3".to_string()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.to_string().contains("CHECK-NOT"));
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";
        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.to_string().contains("CHECK-NEXT"));
    }
}
