//! Archive boundaries
//!
//! A file is due for archiving when the wall clock passes the next period
//! boundary after the file's birth time, or when it grows past a size
//! threshold. The boundary is computed lazily and cached until the birth
//! time changes, which only happens when the file is recreated.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Timelike, Weekday,
};

use super::error::FileError;

/// Calendar period that starts a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchivePeriod {
    #[default]
    None,
    Minute,
    Hour,
    Day,
    /// Next occurrence of the given weekday at midnight
    Weekday(Weekday),
    Month,
    Year,
}

impl ArchivePeriod {
    /// Weekly archiving rolls on Monday
    pub const WEEK: Self = Self::Weekday(Weekday::Mon);

    /// First boundary strictly after `birth`; `None` for `ArchivePeriod::None`
    pub fn next_boundary(self, birth: DateTime<Local>) -> Option<DateTime<Local>> {
        let local = birth.naive_local();
        let date = local.date();
        let next = match self {
            Self::None => return None,
            Self::Minute => truncate(local, local.hour(), local.minute()) + TimeDelta::minutes(1),
            Self::Hour => truncate(local, local.hour(), 0) + TimeDelta::hours(1),
            Self::Day => midnight(date.succ_opt()?),
            Self::Weekday(day) => {
                let start = date.weekday().num_days_from_monday() as i64;
                let mut target = day.num_days_from_monday() as i64;
                if target <= start {
                    target += 7;
                }
                midnight(date + TimeDelta::days(target - start))
            }
            Self::Month => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
                midnight(first.checked_add_months(Months::new(1))?)
            }
            Self::Year => midnight(NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?),
        };
        Some(resolve_local(next))
    }
}

fn truncate(local: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    local.date().and_hms_opt(hour, minute, 0).unwrap_or(local)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Map a wall-clock time to the local zone, skipping forward over DST gaps
fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            Local
                .from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

impl fmt::Display for ArchivePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Minute => f.write_str("minute"),
            Self::Hour => f.write_str("hour"),
            Self::Day => f.write_str("day"),
            Self::Weekday(day) => write!(f, "{}", day.to_string().to_ascii_lowercase()),
            Self::Month => f.write_str("month"),
            Self::Year => f.write_str("year"),
        }
    }
}

impl FromStr for ArchivePeriod {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "none" => Ok(Self::None),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::WEEK),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => other.parse::<Weekday>().map(Self::Weekday).map_err(|_| {
                FileError::invalid_setting(format!("unknown archive period '{other}'"))
            }),
        }
    }
}

/// When to start a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchivePolicy {
    pub period: ArchivePeriod,
    /// Roll once the file reaches this many bytes
    pub above_size: Option<u64>,
}

impl ArchivePolicy {
    pub fn every(period: ArchivePeriod) -> Self {
        Self {
            period,
            above_size: None,
        }
    }

    pub fn with_above_size(mut self, bytes: u64) -> Self {
        self.above_size = Some(bytes).filter(|b| *b > 0);
        self
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.period != ArchivePeriod::None || self.above_size.is_some()
    }
}

/// Per-appender archive bookkeeping
#[derive(Debug, Clone)]
pub struct ArchiveState {
    policy: ArchivePolicy,
    birth: DateTime<Local>,
    computed_for: Option<DateTime<Local>>,
    next: Option<DateTime<Local>>,
    recomputes: u64,
}

impl ArchiveState {
    pub fn new(policy: ArchivePolicy, birth: DateTime<Local>) -> Self {
        Self {
            policy,
            birth,
            computed_for: None,
            next: None,
            recomputes: 0,
        }
    }

    pub fn policy(&self) -> &ArchivePolicy {
        &self.policy
    }

    pub fn birth_time(&self) -> DateTime<Local> {
        self.birth
    }

    /// Record a new birth time; the cached boundary is invalidated only when
    /// the value actually changes
    pub fn set_birth_time(&mut self, birth: DateTime<Local>) {
        self.birth = birth;
    }

    /// Next period boundary, computed on first use per birth time
    pub fn next_archive_time(&mut self) -> Option<DateTime<Local>> {
        if self.computed_for != Some(self.birth) {
            self.next = self.policy.period.next_boundary(self.birth);
            self.computed_for = Some(self.birth);
            self.recomputes += 1;
        }
        self.next
    }

    /// Whether a write at `now` to a file of `length` bytes should roll first
    ///
    /// An empty file is never due.
    pub fn is_due(&mut self, now: DateTime<Local>, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        if let Some(limit) = self.policy.above_size
            && length >= limit
        {
            return true;
        }
        self.next_archive_time().is_some_and(|next| next < now)
    }

    /// How many times the boundary has been computed
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
