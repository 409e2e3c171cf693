//! Token usage accounting.
//!
//! [`TokenUsage`] is the validated, unsigned form stored on stage results.
//! [`UsageCounts`] is the signed form a completion service reports; turning
//! one into the other is where negative counters are rejected.

mod tracker;

pub use tracker::{StageUsage, UsageSummary, UsageTracker};

use crate::errors::InvalidUsageValue;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Validated token counts for one completion or an aggregate of completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the request messages.
    pub prompt_tokens: u64,
    /// Tokens generated in the response.
    pub completion_tokens: u64,
    /// Total tokens billed.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Creates a usage value.
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Returns true if every counter is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Token counts as reported on the wire, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounts {
    /// Reported prompt tokens.
    #[serde(default)]
    pub prompt_tokens: i64,
    /// Reported completion tokens.
    #[serde(default)]
    pub completion_tokens: i64,
    /// Reported total tokens.
    #[serde(default)]
    pub total_tokens: i64,
}

impl UsageCounts {
    /// Creates reported counts.
    #[must_use]
    pub const fn new(prompt_tokens: i64, completion_tokens: i64, total_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

impl From<TokenUsage> for UsageCounts {
    fn from(usage: TokenUsage) -> Self {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Self {
            prompt_tokens: clamp(usage.prompt_tokens),
            completion_tokens: clamp(usage.completion_tokens),
            total_tokens: clamp(usage.total_tokens),
        }
    }
}

impl TryFrom<UsageCounts> for TokenUsage {
    type Error = InvalidUsageValue;

    fn try_from(counts: UsageCounts) -> Result<Self, Self::Error> {
        let check = |field: &'static str, value: i64| {
            u64::try_from(value).map_err(|_| InvalidUsageValue { field, value })
        };
        Ok(Self {
            prompt_tokens: check("prompt_tokens", counts.prompt_tokens)?,
            completion_tokens: check("completion_tokens", counts.completion_tokens)?,
            total_tokens: check("total_tokens", counts.total_tokens)?,
        })
    }
}
