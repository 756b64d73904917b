//! Schedule value types
//!
//! `DeletionFrequency` is what a user picks on their profile, `ScheduleSpec`
//! is what the catalog stores, and `JobName` is the catalog key.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// How often a user's completed tasks are purged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionFrequency {
    #[default]
    Never,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl DeletionFrequency {
    pub const ALL: [DeletionFrequency; 6] = [
        DeletionFrequency::Never,
        DeletionFrequency::Minute,
        DeletionFrequency::Hour,
        DeletionFrequency::Day,
        DeletionFrequency::Week,
        DeletionFrequency::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionFrequency::Never => "never",
            DeletionFrequency::Minute => "minute",
            DeletionFrequency::Hour => "hour",
            DeletionFrequency::Day => "day",
            DeletionFrequency::Week => "week",
            DeletionFrequency::Month => "month",
        }
    }
}

impl fmt::Display for DeletionFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input outside the closed set of frequencies
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid deletion frequency: {0:?}")]
pub struct InvalidFrequency(pub String);

impl FromStr for DeletionFrequency {
    type Err = InvalidFrequency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeletionFrequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| InvalidFrequency(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    fn span(&self, every: NonZeroU32) -> TimeDelta {
        let n = i64::from(every.get());
        match self {
            IntervalUnit::Minutes => TimeDelta::minutes(n),
            IntervalUnit::Hours => TimeDelta::hours(n),
            IntervalUnit::Days => TimeDelta::days(n),
            IntervalUnit::Weeks => TimeDelta::weeks(n),
        }
    }
}

/// Recurrence of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Every `every` units, counted from the previous run
    Interval { every: NonZeroU32, unit: IntervalUnit },
    /// Calendar match on minute, hour and day of month (UTC)
    Cron {
        minute: u32,
        hour: u32,
        day_of_month: u32,
    },
}

impl ScheduleSpec {
    /// Six-field expression (`sec min hour dom month dow`) understood by the `cron` crate
    pub fn cron_expression(&self) -> Option<String> {
        match self {
            ScheduleSpec::Cron {
                minute,
                hour,
                day_of_month,
            } => Some(format!("0 {minute} {hour} {day_of_month} * *")),
            ScheduleSpec::Interval { .. } => None,
        }
    }

    /// First instant strictly after `after` at which the schedule fires.
    ///
    /// Returns `None` when the schedule can never fire again, e.g. a cron
    /// spec with an out-of-range field.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Interval { every, unit } => after.checked_add_signed(unit.span(*every)),
            ScheduleSpec::Cron { .. } => {
                let expression = self.cron_expression()?;
                let schedule = cron::Schedule::from_str(&expression).ok()?;
                schedule.after(&after).next()
            }
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Interval { every, unit } => write!(f, "every {every} {unit:?}"),
            ScheduleSpec::Cron {
                minute,
                hour,
                day_of_month,
            } => write!(f, "cron {minute} {hour} {day_of_month} * *"),
        }
    }
}

const JOB_NAME_PREFIX: &str = "delete_tasks_";

/// Catalog key of a user's periodic deletion job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    pub fn for_user(username: &str) -> Self {
        Self(format!("{JOB_NAME_PREFIX}{username}"))
    }

    /// Rebuild a name read back from storage
    pub(crate) fn from_stored(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
