//! Conflict answers from the command line.
//!
//! With `--on-conflict ask` each collision is shown on stderr and answered
//! on stdin; every other policy answers all collisions the same way.

use engine::{ConflictAction, ConflictDecision, ConflictRequest};
use std::io::{BufRead, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Ask,
    Replace,
    Skip,
    Rename,
    Cancel,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(ConflictPolicy::Ask),
            "replace" | "overwrite" => Ok(ConflictPolicy::Replace),
            "skip" => Ok(ConflictPolicy::Skip),
            "rename" => Ok(ConflictPolicy::Rename),
            "cancel" => Ok(ConflictPolicy::Cancel),
            _ => Err(format!(
                "Invalid conflict policy '{}'. Must be 'ask', 'replace', 'skip', 'rename', or 'cancel'",
                s
            )),
        }
    }
}

impl ConflictPolicy {
    /// The standing answer, or `None` when the user has to be asked.
    pub fn standing_decision(self) -> Option<ConflictDecision> {
        let action = match self {
            ConflictPolicy::Ask => return None,
            ConflictPolicy::Replace => ConflictAction::Replace,
            ConflictPolicy::Skip => ConflictAction::Skip,
            ConflictPolicy::Rename => ConflictAction::Rename,
            ConflictPolicy::Cancel => ConflictAction::Cancel,
        };
        Some(ConflictDecision::for_all(action))
    }
}

/// Parse one prompt answer.
///
/// `r`eplace, `s`kip, `n` (rename to the suggestion), `c`ancel; an upper-case
/// letter applies the answer to all remaining conflicts. `n <name>` renames
/// to `<name>` instead.
pub fn parse_answer(line: &str) -> Option<ConflictDecision> {
    let line = line.trim();
    let mut chars = line.chars();
    let letter = chars.next()?;
    let rest = chars.as_str();
    let apply_to_all = letter.is_uppercase();

    let action = match letter.to_ascii_lowercase() {
        'r' => ConflictAction::Replace,
        's' => ConflictAction::Skip,
        'n' => ConflictAction::Rename,
        'c' => ConflictAction::Cancel,
        _ => return None,
    };

    if action == ConflictAction::Rename && !apply_to_all {
        let name = rest.trim();
        if !name.is_empty() {
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            return Some(ConflictDecision::rename_to(name));
        }
    } else if !rest.trim().is_empty() {
        return None;
    }

    Some(ConflictDecision {
        action,
        apply_to_all,
        new_name: None,
    })
}

/// Ask until a valid answer arrives. End of input cancels the job.
pub fn ask<R: BufRead, W: Write>(request: &ConflictRequest, input: &mut R, output: &mut W) -> ConflictDecision {
    let _ = writeln!(output);
    let _ = writeln!(output, "Destination already exists: {}", request.destination.display());
    let _ = writeln!(output, "  Source: {}", request.source.display());

    loop {
        let _ = write!(
            output,
            "[r]eplace, [s]kip, re[n]ame to \"{}\" (or 'n <name>'), [c]ancel; capital letter = all: ",
            request.suggested_name
        );
        let _ = output.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return ConflictDecision::once(ConflictAction::Cancel),
            Ok(_) => {}
        }
        if let Some(decision) = parse_answer(&line) {
            return decision;
        }
        let _ = writeln!(output, "Unrecognized answer '{}'", line.trim());
    }
}
