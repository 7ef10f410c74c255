//! Payload command lists: line filtering and argument-vector splitting.
//!
//! The payload stage emits one fully-formed request command per line. The
//! harness never hands those lines to a shell; each line is split here into
//! an argument vector using POSIX-style quoting.

use crate::error::{ScoutError, ScoutResult};
use std::path::Path;

/// One executable line from a payload artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// 1-based position among the retained lines.
    pub id: usize,
    /// The line as written, trimmed.
    pub text: String,
}

/// Keep non-blank lines that do not start with `#`, numbered from 1.
pub fn parse_command_list(content: &str) -> Vec<CommandLine> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .enumerate()
        .map(|(i, l)| CommandLine {
            id: i + 1,
            text: l.to_string(),
        })
        .collect()
}

/// Read and filter a payload artifact.
pub fn read_command_list(path: &Path) -> ScoutResult<Vec<CommandLine>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ScoutError::Artifact(format!("cannot read command list {}: {e}", path.display()))
    })?;
    Ok(parse_command_list(&content))
}

/// Split a command line into arguments.
///
/// Single quotes preserve everything literally; double quotes allow `\"`,
/// `\\`, `\$` and `` \` `` escapes; an unquoted backslash escapes the next
/// character. Shell operators have no special meaning.
pub fn split_command(line: &str) -> ScoutResult<Vec<String>> {
    #[derive(PartialEq)]
    enum Mode {
        Plain,
        Single,
        Double,
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut mode = Mode::Plain;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Plain => match c {
                c if c.is_whitespace() => {
                    if in_word {
                        args.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    in_word = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_word = true;
                }
                '\\' => {
                    let next = chars.next().ok_or_else(|| {
                        ScoutError::InvalidInput("trailing backslash in command".to_string())
                    })?;
                    current.push(next);
                    in_word = true;
                }
                other => {
                    current.push(other);
                    in_word = true;
                }
            },
            Mode::Single => match c {
                '\'' => mode = Mode::Plain,
                other => current.push(other),
            },
            Mode::Double => match c {
                '"' => mode = Mode::Plain,
                '\\' => match chars.peek() {
                    Some(&next @ ('"' | '\\' | '$' | '`')) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                other => current.push(other),
            },
        }
    }

    if mode != Mode::Plain {
        return Err(ScoutError::InvalidInput(format!(
            "unbalanced quote in command: {line}"
        )));
    }
    if in_word {
        args.push(current);
    }
    if args.is_empty() {
        return Err(ScoutError::InvalidInput("empty command".to_string()));
    }
    Ok(args)
}
