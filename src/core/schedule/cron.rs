use crate::core::error::ScheduleError;
use chrono::{DateTime, TimeZone, Utc};
use croner::Cron;
use std::fmt;
use std::str::FromStr;

/// Wall-clock occurrences passed over before giving up. A DST transition
/// hides at most an hour of per-minute occurrences.
const MAX_SKIPPED: usize = 128;

const MAX_DAY_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A five-field cron rule where each field is `*` or a single value.
///
/// Fields: minute (0-59), hour (0-23), day of month (1-31), month (1-12),
/// day of week (0-7, both 0 and 7 are Sunday).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Option<u32>,
    hour: Option<u32>,
    day_of_month: Option<u32>,
    month: Option<u32>,
    day_of_week: Option<u32>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        let schedule = Self {
            minute: parse_field("minute", fields[0], 0, 59)?,
            hour: parse_field("hour", fields[1], 0, 23)?,
            day_of_month: parse_field("day-of-month", fields[2], 1, 31)?,
            month: parse_field("month", fields[3], 1, 12)?,
            day_of_week: parse_field("day-of-week", fields[4], 0, 7)?.map(|dow| dow % 7),
        };

        if let (Some(day), Some(month), None) =
            (schedule.day_of_month, schedule.month, schedule.day_of_week)
        {
            if day > MAX_DAY_IN_MONTH[(month - 1) as usize] {
                return Err(ScheduleError::ImpossibleDate(expr.to_string()));
            }
        }
        schedule.cron()?;
        Ok(schedule)
    }

    /// First fire instant strictly after `after`, in `after`'s time zone.
    ///
    /// Occurrences are searched on the wall clock, then mapped into the zone:
    /// local times that fall in a DST gap are skipped, ambiguous local times
    /// resolve to their earliest mapping.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<Tz>, ScheduleError> {
        let cron = self.cron()?;
        let tz = after.timezone();
        let mut wall = Utc.from_utc_datetime(&after.naive_local());
        for _ in 0..MAX_SKIPPED {
            wall = cron
                .find_next_occurrence(&wall, false)
                .map_err(|_| ScheduleError::NoUpcoming(self.to_string()))?;
            match tz.from_local_datetime(&wall.naive_utc()).earliest() {
                Some(candidate) if candidate > *after => return Ok(candidate),
                _ => continue,
            }
        }
        Err(ScheduleError::NoUpcoming(self.to_string()))
    }

    /// The next `count` fire instants after `after`.
    pub fn upcoming<Tz: TimeZone>(
        &self,
        after: &DateTime<Tz>,
        count: usize,
    ) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
        let mut out: Vec<DateTime<Tz>> = Vec::with_capacity(count);
        let mut cursor = after.clone();
        for _ in 0..count {
            let next = self.next_after(&cursor)?;
            cursor = next.clone();
            out.push(next);
        }
        Ok(out)
    }

    fn cron(&self) -> Result<Cron, ScheduleError> {
        Cron::new(&self.to_string())
            .parse()
            .map_err(|err| ScheduleError::InvalidField {
                field: "expression",
                value: format!("{} ({})", self, err),
            })
    }
}

fn parse_field(
    field: &'static str,
    raw: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>, ScheduleError> {
    if raw == "*" {
        return Ok(None);
    }
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScheduleError::InvalidField {
            field,
            value: raw.to_string(),
        });
    }
    let value: u32 = raw.parse().map_err(|_| ScheduleError::InvalidField {
        field,
        value: raw.to_string(),
    })?;
    if value < min || value > max {
        return Err(ScheduleError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(Some(value))
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            self.minute,
            self.hour,
            self.day_of_month,
            self.month,
            self.day_of_week,
        ];
        for (position, field) in fields.iter().enumerate() {
            if position > 0 {
                f.write_str(" ")?;
            }
            match field {
                Some(value) => write!(f, "{}", value)?,
                None => f.write_str("*")?,
            }
        }
        Ok(())
    }
}
