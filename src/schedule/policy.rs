//! Deletion policy: maps a user's chosen frequency to a schedule

use super::spec::{DeletionFrequency, IntervalUnit, ScheduleSpec};
use std::num::NonZeroU32;

const fn every(unit: IntervalUnit) -> Option<ScheduleSpec> {
    Some(ScheduleSpec::Interval {
        every: NonZeroU32::MIN,
        unit,
    })
}

/// Resolve the schedule for a frequency. `Never` has no schedule.
/// `Week` resolves to a one-week interval.
pub fn resolve(frequency: DeletionFrequency) -> Option<ScheduleSpec> {
    match frequency {
        DeletionFrequency::Never => None,
        DeletionFrequency::Minute => every(IntervalUnit::Minutes),
        DeletionFrequency::Hour => every(IntervalUnit::Hours),
        DeletionFrequency::Day => every(IntervalUnit::Days),
        DeletionFrequency::Week => every(IntervalUnit::Weeks),
        DeletionFrequency::Month => Some(ScheduleSpec::Cron {
            minute: 0,
            hour: 0,
            day_of_month: 1,
        }),
    }
}
