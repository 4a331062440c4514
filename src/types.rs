// src/types.rs

use std::fmt;
use std::str::FromStr;

use crate::errors::TaskpipeError;

/// Which decorator renders stage output on the terminal.
///
/// - `Raw`: stage output is passed through untouched.
/// - `Prefixed`: every line is prefixed with the stage name.
/// - `Cockpit`: a live dashboard of running stages; output itself goes only to
///   the log sinks and the capture buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Raw,
    Prefixed,
    Cockpit,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Prefixed => "prefixed",
            OutputFormat::Cockpit => "cockpit",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TaskpipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "prefixed" => Ok(OutputFormat::Prefixed),
            "cockpit" => Ok(OutputFormat::Cockpit),
            _ => Err(TaskpipeError::UnknownOutputFormat(s.to_string())),
        }
    }
}
