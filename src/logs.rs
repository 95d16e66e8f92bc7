//! Transaction log scanning.
//!
//! Runtime logs bracket every program call with `Program <id> invoke [depth]` and
//! `Program <id> success` / `Program <id> failed: ..`. Replaying that stack attributes each
//! `Program data: <base64>` line to the program that emitted it and to the top-level
//! instruction it ran under.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

const PROGRAM_PREFIX: &str = "Program ";
const PROGRAM_DATA_PREFIX: &str = "Program data: ";
const INSTRUCTION_PREFIX: &str = "Program log: Instruction: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    /// Innermost program on the invoke stack when the line was logged.
    pub program_id: Option<String>,
    pub top_level: Option<usize>,
    /// Position among the `Program data:` lines of the transaction.
    pub index: usize,
    pub data: Vec<u8>,
}

enum LogLine<'a> {
    Invoke { program_id: &'a str, depth: usize },
    Exit,
    Data(&'a str),
    Other,
}

fn classify(line: &str) -> LogLine<'_> {
    if let Some(encoded) = line.strip_prefix(PROGRAM_DATA_PREFIX) {
        return LogLine::Data(encoded.trim());
    }
    let Some(rest) = line.strip_prefix(PROGRAM_PREFIX) else {
        return LogLine::Other;
    };
    let Some((program_id, tail)) = rest.split_once(' ') else {
        return LogLine::Other;
    };
    if let Some(depth) = tail
        .strip_prefix("invoke [")
        .and_then(|d| d.strip_suffix(']'))
        .and_then(|d| d.parse().ok())
    {
        return LogLine::Invoke { program_id, depth };
    }
    if tail == "success" || tail.starts_with("failed") {
        return LogLine::Exit;
    }
    LogLine::Other
}

pub fn extract_program_data(logs: &[String]) -> Vec<LogPayload> {
    let mut stack: Vec<&str> = Vec::new();
    let mut top_level: Option<usize> = None;
    let mut payloads = Vec::new();
    let mut index = 0;

    for line in logs {
        match classify(line) {
            LogLine::Invoke { program_id, depth } => {
                if depth == 1 {
                    stack.clear();
                    top_level = Some(top_level.map_or(0, |t| t + 1));
                }
                stack.push(program_id);
            }
            LogLine::Exit => {
                stack.pop();
            }
            LogLine::Data(encoded) => {
                let position = index;
                index += 1;
                match STANDARD.decode(encoded) {
                    Ok(data) => payloads.push(LogPayload {
                        program_id: stack.last().map(|p| (*p).to_string()),
                        top_level: if stack.is_empty() { None } else { top_level },
                        index: position,
                        data,
                    }),
                    Err(e) => {
                        debug!(index = position, error = %e, "skipping undecodable program data");
                    }
                }
            }
            LogLine::Other => {}
        }
    }
    payloads
}

/// Names from `Program log: Instruction: <Name>` lines, in log order.
pub fn instruction_names(logs: &[String]) -> Vec<&str> {
    logs.iter()
        .filter_map(|line| line.strip_prefix(INSTRUCTION_PREFIX))
        .map(str::trim)
        .collect()
}

pub fn mentions_instruction(logs: &[String], name: &str) -> bool {
    instruction_names(logs)
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}
