//! The role identity this process was launched to fill.
//!
//! Parsing mirrors `streamcore::lifecycle::Role`'s `Display` impl exactly —
//! the manager passes `--role <this>` on the command line using that same
//! format.

use std::fmt;
use std::str::FromStr;

use streamcore::protocol_constants::{MAX_RECONSTRUCT_ATTEMPTS_INPUT, MAX_RECONSTRUCT_ATTEMPTS_OUTPUT, MAX_RECONSTRUCT_ATTEMPTS_TRANSCODER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Transcoder,
    Output(usize),
}

impl Role {
    /// Per-role bound on in-process reconstruction attempts before this
    /// process gives up and exits fatally.
    #[must_use]
    pub fn max_reconstruct_attempts(self) -> u32 {
        match self {
            Role::Input => MAX_RECONSTRUCT_ATTEMPTS_INPUT,
            Role::Transcoder => MAX_RECONSTRUCT_ATTEMPTS_TRANSCODER,
            Role::Output(_) => MAX_RECONSTRUCT_ATTEMPTS_OUTPUT,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Input => write!(f, "input"),
            Role::Transcoder => write!(f, "transcoder"),
            Role::Output(i) => write!(f, "output[{i}]"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid role string {0:?}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "input" {
            return Ok(Role::Input);
        }
        if s == "transcoder" {
            return Ok(Role::Transcoder);
        }
        if let Some(inner) = s.strip_prefix("output[").and_then(|rest| rest.strip_suffix(']')) {
            if let Ok(index) = inner.parse::<usize>() {
                return Ok(Role::Output(index));
            }
        }
        Err(ParseRoleError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        assert_eq!("input".parse::<Role>().unwrap(), Role::Input);
        assert_eq!("transcoder".parse::<Role>().unwrap(), Role::Transcoder);
        assert_eq!("output[2]".parse::<Role>().unwrap(), Role::Output(2));
        assert_eq!(Role::Output(3).to_string(), "output[3]");
    }

    #[test]
    fn rejects_garbage() {
        assert!("bogus".parse::<Role>().is_err());
        assert!("output[x]".parse::<Role>().is_err());
    }
}
