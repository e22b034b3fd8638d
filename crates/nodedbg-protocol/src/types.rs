use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Correlation key between one request and its reply.
///
/// Assigned by [`crate::CommandChannel`], monotonically increasing from 1 for the lifetime of
/// one connection.
pub type SequenceId = u64;

/// Debuggee-scoped identifier of one value.
///
/// Handles are only meaningful for the debuggee's current pause point; they must not be cached
/// across resumes or steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i64);

impl Handle {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for Handle {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}
