//! Tiered retention policy
//!
//! Given "now" and every existing snapshot, decide which snapshots survive.
//! Ages are measured against four cutoffs computed once from "now":
//!
//! - hourly: everything at or after the hourly cutoff is kept
//! - daily: one per calendar day, the one closest to midnight
//! - weekly: one per Monday-started week, the one closest to Sunday
//! - monthly: one per calendar month, the one closest to the 1st
//!
//! Anything older than the monthly cutoff is dropped. Windows are half-open
//! and never overlap, so each snapshot is judged by exactly one tier.

use std::collections::{BTreeMap, BTreeSet};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::config::RetentionConfig;
use crate::database::storage::Snapshot;

/// Retention tier a snapshot falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Tier boundaries for one retention run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub hourly: NaiveDateTime,
    pub daily: NaiveDateTime,
    pub weekly: NaiveDateTime,
    pub monthly: NaiveDateTime,
}

impl Cutoffs {
    /// Compute cutoffs from a single reading of "now".
    ///
    /// Months are a flat 31 days. Each cutoff is clamped to be no later than
    /// the one before it so the windows stay contiguous. A window reaching
    /// past the earliest representable time starts there instead.
    pub fn new(now: NaiveDateTime, config: &RetentionConfig) -> Self {
        let hourly = back(now, Duration::try_hours(i64::from(config.hourly_hours)));
        let daily = back(now, Duration::try_days(i64::from(config.daily_days))).min(hourly);
        let weekly = back(now, Duration::try_weeks(i64::from(config.weekly_weeks))).min(daily);
        let monthly =
            back(now, Duration::try_days(31 * i64::from(config.monthly_months))).min(weekly);

        Self {
            hourly,
            daily,
            weekly,
            monthly,
        }
    }

    /// Which tier judges a snapshot captured at `t`, if any
    pub fn classify(&self, t: NaiveDateTime) -> Option<Tier> {
        if t >= self.hourly {
            Some(Tier::Hourly)
        } else if t >= self.daily {
            Some(Tier::Daily)
        } else if t >= self.weekly {
            Some(Tier::Weekly)
        } else if t >= self.monthly {
            Some(Tier::Monthly)
        } else {
            None
        }
    }
}

fn back(now: NaiveDateTime, window: Option<Duration>) -> NaiveDateTime {
    window
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Outcome of a retention decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Names to keep
    pub keep: BTreeSet<String>,
    /// Names to delete, in input order
    pub delete: Vec<String>,
}

/// Bucket key inside a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Day(NaiveDate),
    Week(i32, u32),
    Month(i32, u32),
}

/// Week number with Monday as the first day; days before the year's first
/// Monday are week 0
fn monday_week(date: NaiveDate) -> u32 {
    (date.ordinal0() + 7 - date.weekday().num_days_from_monday()) / 7
}

fn bucket_of(tier: Tier, t: NaiveDateTime) -> Option<Bucket> {
    let date = t.date();
    match tier {
        Tier::Hourly => None,
        Tier::Daily => Some(Bucket::Day(date)),
        Tier::Weekly => Some(Bucket::Week(date.year(), monday_week(date))),
        Tier::Monthly => Some(Bucket::Month(date.year(), date.month())),
    }
}

/// How far a snapshot is from its bucket's preferred moment; lower wins
fn distance(bucket: Bucket, t: NaiveDateTime) -> u32 {
    match bucket {
        Bucket::Day(_) => t.num_seconds_from_midnight(),
        // Tie-break order within a week: Sunday 0, Saturday 1, ... Monday 6
        Bucket::Week(..) => 6 - t.weekday().num_days_from_monday(),
        Bucket::Month(..) => t.day() - 1,
    }
}

/// Names of the snapshots to keep
pub fn compute_retained(
    now: NaiveDateTime,
    snapshots: &[Snapshot],
    config: &RetentionConfig,
) -> BTreeSet<String> {
    let cutoffs = Cutoffs::new(now, config);

    let mut keep = BTreeSet::new();
    let mut buckets: BTreeMap<Bucket, Vec<&Snapshot>> = BTreeMap::new();

    for snapshot in snapshots {
        match cutoffs.classify(snapshot.captured_at) {
            Some(Tier::Hourly) => {
                keep.insert(snapshot.name.clone());
            }
            Some(tier) => {
                if let Some(bucket) = bucket_of(tier, snapshot.captured_at) {
                    buckets.entry(bucket).or_default().push(snapshot);
                }
            }
            None => {}
        }
    }

    for (bucket, members) in buckets {
        // min_by_key keeps the first of equal candidates, i.e. input order
        if let Some(best) = members
            .into_iter()
            .min_by_key(|s| distance(bucket, s.captured_at))
        {
            keep.insert(best.name.clone());
        }
    }

    keep
}

/// Split snapshots into the ones to keep and the ones to delete
pub fn plan(
    now: NaiveDateTime,
    snapshots: &[Snapshot],
    config: &RetentionConfig,
) -> RetentionPlan {
    let keep = compute_retained(now, snapshots, config);
    let delete = snapshots
        .iter()
        .filter(|s| !keep.contains(&s.name))
        .map(|s| s.name.clone())
        .collect();

    RetentionPlan { keep, delete }
}
