//! Interactive approval step between assembly and signing

use super::builder::UnsignedTx;
use crate::error::PipelineResult;

use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;
use tracing::{debug, info};

pub const CONFIRM_PROMPT: &str = "confirm transaction before signing and broadcasting";
pub const CANCELLED_MESSAGE: &str = "cancelled transaction";

/// Unrecognised answers before giving up and treating the prompt as declined
const MAX_PROMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Declined,
}

enum Source {
    Interactive {
        input: Mutex<Box<dyn BufRead + Send>>,
        output: Mutex<Box<dyn Write + Send>>,
    },
    Preset(Decision),
}

/// Shows the unsigned transaction to the operator and waits for an answer
pub struct ConfirmationGate {
    source: Source,
}

impl ConfirmationGate {
    /// Prompt on stderr and read the answer from stdin
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }

    pub fn new(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            source: Source::Interactive {
                input: Mutex::new(Box::new(input)),
                output: Mutex::new(Box::new(output)),
            },
        }
    }

    /// Answer every prompt with `decision` without any I/O
    pub fn preset(decision: Decision) -> Self {
        Self {
            source: Source::Preset(decision),
        }
    }

    /// Render `tx` and ask for approval
    ///
    /// End of input or an empty answer declines.
    pub fn confirm(&self, tx: &UnsignedTx) -> PipelineResult<Decision> {
        let (input, output) = match &self.source {
            Source::Preset(decision) => {
                debug!("Confirmation preset to {:?}", decision);
                return Ok(*decision);
            }
            Source::Interactive { input, output } => (input, output),
        };

        let mut input = input.lock().unwrap_or_else(|e| e.into_inner());
        let mut output = output.lock().unwrap_or_else(|e| e.into_inner());

        writeln!(output, "{}\n", tx.to_json()?)?;

        let mut decision = Decision::Declined;
        for _ in 0..MAX_PROMPTS {
            write!(output, "{} [y/N]: ", CONFIRM_PROMPT)?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                break;
            }

            match parse_answer(&line) {
                Some(answer) => {
                    decision = answer;
                    break;
                }
                None => writeln!(output, "please answer y or n")?,
            }
        }

        if decision == Decision::Declined {
            writeln!(output, "{}", CANCELLED_MESSAGE)?;
            info!("Operator declined the transaction");
        }
        Ok(decision)
    }
}

fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Decision::Approved),
        "" | "n" | "no" => Some(Decision::Declined),
        _ => None,
    }
}
