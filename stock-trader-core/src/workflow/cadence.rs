//! Minute-granularity cron-like trigger cadence

use crate::error::CadenceError;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parsed `minute hour day-of-month month day-of-week` expression.
///
/// Only the minute and hour fields may restrict the schedule; the calendar
/// fields must be `*` or `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    expression: String,
    /// Bit `n` set when minute `n` matches
    minutes: u64,
    /// Bit `n` set when hour `n` matches
    hours: u32,
}

impl Cadence {
    /// `* * * * *`
    pub fn every_minute() -> Self {
        Self {
            expression: "* * * * *".to_string(),
            minutes: full_mask(60),
            hours: full_mask(24) as u32,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Whether `at` falls on a matching minute
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minutes & (1 << at.minute()) != 0 && self.hours & (1 << at.hour()) != 0
    }

    /// First matching minute boundary strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = truncate_to_minute(after) + Duration::minutes(1);
        // minute and hour masks repeat daily, so one day of candidates suffices
        for _ in 0..MINUTES_PER_DAY {
            if self.matches(candidate) {
                return candidate;
            }
            candidate += Duration::minutes(1);
        }
        candidate
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::every_minute()
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for Cadence {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CadenceError::FieldCount(fields.len()));
        }

        let minutes = parse_field("minute", fields[0], 60)?;
        let hours = parse_field("hour", fields[1], 24)? as u32;
        for (name, value) in [
            ("day-of-month", fields[2]),
            ("month", fields[3]),
            ("day-of-week", fields[4]),
        ] {
            if value != "*" && value != "?" {
                return Err(CadenceError::Unsupported {
                    field: name,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes,
            hours,
        })
    }
}

/// Parse one field into a bitmask of values in `0..limit`
fn parse_field(field: &'static str, value: &str, limit: u32) -> Result<u64, CadenceError> {
    let invalid = || CadenceError::InvalidField {
        field,
        value: value.to_string(),
    };
    let number = |s: &str| -> Result<u32, CadenceError> {
        s.parse::<u32>()
            .ok()
            .filter(|n| *n < limit)
            .ok_or_else(invalid)
    };

    let mut mask = 0u64;
    for item in value.split(',') {
        if item == "*" {
            mask |= full_mask(limit);
        } else if let Some(step) = item.strip_prefix("*/") {
            let step: u32 = step.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?;
            for n in (0..limit).step_by(step as usize) {
                mask |= 1 << n;
            }
        } else if let Some((start, end)) = item.split_once('-') {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(invalid());
            }
            for n in start..=end {
                mask |= 1 << n;
            }
        } else {
            mask |= 1 << number(item)?;
        }
    }

    Ok(mask)
}

fn full_mask(limit: u32) -> u64 {
    (1u64 << limit) - 1
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::seconds(at.second() as i64) - Duration::nanoseconds(at.nanosecond() as i64)
}
