//! Year/month partition keys shared by the metadata table and the webhook.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Invalid month token: {0}")]
    InvalidMonth(String),
    #[error("Invalid month number: {0}")]
    InvalidMonthNumber(u32),
}

/// Calendar month, written as a three-letter English abbreviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

const MONTHS: [Month; 12] = [
    Month::Jan,
    Month::Feb,
    Month::Mar,
    Month::Apr,
    Month::May,
    Month::Jun,
    Month::Jul,
    Month::Aug,
    Month::Sep,
    Month::Oct,
    Month::Nov,
    Month::Dec,
];

impl Month {
    /// Abbreviation as it appears in report filenames, e.g. `Jul`.
    pub fn abbrev(self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    /// Lowercase form used in blob paths, tags and partition keys.
    pub fn lower(self) -> String {
        self.abbrev().to_ascii_lowercase()
    }

    /// 1-based month number.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(n: u32) -> Result<Self, PartitionError> {
        match n {
            1..=12 => Ok(MONTHS[(n - 1) as usize]),
            _ => Err(PartitionError::InvalidMonthNumber(n)),
        }
    }
}

impl FromStr for Month {
    type Err = PartitionError;

    /// Accepts exactly the twelve abbreviations, in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MONTHS
            .iter()
            .copied()
            .find(|m| m.abbrev().eq_ignore_ascii_case(s))
            .ok_or_else(|| PartitionError::InvalidMonth(s.to_string()))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbrev())
    }
}

/// Grouping key: `{year}-{mon}` for monthly reports, `{year}-{mon}-{DD}` for daily summaries,
/// or a fixed name for undated ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn monthly(year: i32, month: Month) -> Self {
        Self(format!("{year}-{}", month.lower()))
    }

    pub fn daily(year: i32, month: Month, day: u32) -> Self {
        Self(format!("{year}-{}-{day:02}", month.lower()))
    }

    /// Constant partition shared by every file of an undated report.
    pub fn fixed(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `{year}-{mon}` prefix. Equal to the key itself for monthly partitions.
    pub fn period(&self) -> &str {
        match self.0.match_indices('-').nth(1) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the monthly partition key for a year and a three-letter month token.
pub fn derive_partition_key(year: i32, month: &str) -> Result<PartitionKey, PartitionError> {
    let month: Month = month.parse()?;
    Ok(PartitionKey::monthly(year, month))
}
