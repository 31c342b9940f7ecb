//! Free-text schedule time parsing.
//!
//! Pure functions: the caller passes `now` (in the user's timezone) and gets
//! back an absolute instant in the same timezone.
//!
//! | Input                 | Meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `30分後`, `+30m`      | 30 minutes from now                       |
//! | `2時間後`, `+2h`      | 2 hours from now                          |
//! | `2時間30分後`, `+2h30m` | 2 h 30 min from now                     |
//! | `3日後`, `+3d`        | 3 days from now                           |
//! | `2025-01-15 14:30`    | absolute (also `/` separators, `T`)       |
//! | `01-15 14:30`         | this year, next year if already past      |
//! | `15日 14:30`          | this month, next month if already past    |
//! | `14:30`               | today, tomorrow if already past           |

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::ValidationError;

enum Pattern {
    MinutesLater,
    HoursLater,
    HoursMinutesLater,
    DaysLater,
    Offset,
    FullDate,
    MonthDay,
    DayOfMonth,
    TimeOnly,
}

fn patterns() -> &'static [(Regex, Pattern)] {
    static PATTERNS: OnceLock<Vec<(Regex, Pattern)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table = [
            (r"^(\d+)時間(\d+)分後$", Pattern::HoursMinutesLater),
            (r"^(\d+)分後$", Pattern::MinutesLater),
            (r"^(\d+)時間後$", Pattern::HoursLater),
            (r"^(\d+)日後$", Pattern::DaysLater),
            (r"^\+(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?$", Pattern::Offset),
            (
                r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:\s+|T)(\d{1,2}):(\d{2})$",
                Pattern::FullDate,
            ),
            (
                r"^(\d{1,2})[-/](\d{1,2})\s+(\d{1,2}):(\d{2})$",
                Pattern::MonthDay,
            ),
            (r"^(\d{1,2})日\s*(\d{1,2}):(\d{2})$", Pattern::DayOfMonth),
            (r"^(\d{1,2}):(\d{2})$", Pattern::TimeOnly),
        ];
        table
            .into_iter()
            .filter_map(|(re, p)| Regex::new(re).ok().map(|re| (re, p)))
            .collect()
    })
}

/// Parse a schedule phrase relative to `now`.
///
/// Returns `None` for unrecognised input or impossible calendar values.
/// The result may still be in the past for fully-specified dates; use
/// [`validate_schedule_time`] to reject those.
pub fn parse_schedule_time<Tz: TimeZone>(input: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let input = input.trim();
    for (re, pattern) in patterns() {
        let Some(caps) = re.captures(input) else {
            continue;
        };
        let num = |i: usize| -> Option<i64> {
            caps.get(i)
                .map(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(Some(0))
        };
        return match pattern {
            Pattern::MinutesLater => later(now, Duration::try_minutes(num(1)?)?),
            Pattern::HoursLater => later(now, Duration::try_hours(num(1)?)?),
            Pattern::HoursMinutesLater => later(
                now,
                Duration::try_hours(num(1)?)?.checked_add(&Duration::try_minutes(num(2)?)?)?,
            ),
            Pattern::DaysLater => later(now, Duration::try_days(num(1)?)?),
            Pattern::Offset => {
                if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
                    return None;
                }
                let delta = Duration::try_days(num(1)?)?
                    .checked_add(&Duration::try_hours(num(2)?)?)?
                    .checked_add(&Duration::try_minutes(num(3)?)?)?;
                later(now, delta)
            }
            Pattern::FullDate => {
                let date = ymd(num(1)?, num(2)?, num(3)?)?;
                at_local(now, date, num(4)?, num(5)?)
            }
            Pattern::MonthDay => {
                let (month, day, hour, minute) = (num(1)?, num(2)?, num(3)?, num(4)?);
                let year = now.year() as i64;
                let this_year = ymd(year, month, day).and_then(|d| at_local(now, d, hour, minute));
                match this_year {
                    Some(t) if t > *now => Some(t),
                    _ => ymd(year + 1, month, day).and_then(|d| at_local(now, d, hour, minute)),
                }
            }
            Pattern::DayOfMonth => {
                let (day, hour, minute) = (num(1)?, num(2)?, num(3)?);
                let (year, month) = (now.year() as i64, now.month() as i64);
                let this_month = ymd(year, month, day).and_then(|d| at_local(now, d, hour, minute));
                match this_month {
                    Some(t) if t > *now => Some(t),
                    _ => {
                        let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                        ymd(ny, nm, day).and_then(|d| at_local(now, d, hour, minute))
                    }
                }
            }
            Pattern::TimeOnly => {
                let (hour, minute) = (num(1)?, num(2)?);
                let today = now.date_naive();
                match at_local(now, today, hour, minute) {
                    Some(t) if t > *now => Some(t),
                    _ => at_local(now, today.succ_opt()?, hour, minute),
                }
            }
        };
    }
    None
}

/// Reject times that are not strictly in the future.
pub fn validate_schedule_time<Tz: TimeZone>(
    at: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Result<(), ValidationError>
where
    Tz::Offset: std::fmt::Display,
{
    if at <= now {
        return Err(ValidationError::PastTime(
            at.format("%Y-%m-%d %H:%M").to_string(),
        ));
    }
    Ok(())
}

/// Parse, reject past times, and normalise to UTC for storage.
pub fn resolve_schedule_time<Tz: TimeZone>(
    input: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, ValidationError>
where
    Tz::Offset: std::fmt::Display,
{
    let at = parse_schedule_time(input, now)
        .ok_or_else(|| ValidationError::UnparsableTime(input.trim().to_string()))?;
    validate_schedule_time(&at, now)?;
    Ok(at.with_timezone(&Utc))
}

/// Help text listing every accepted format.
pub fn supported_formats() -> &'static str {
    "**Absolute**\n\
     • `2025-01-15 14:30` or `2025/01/15 14:30` (date and time)\n\
     • `01-15 14:30` or `01/15 14:30` (this year)\n\
     • `15日 14:30` (this month)\n\
     • `14:30` (today, tomorrow if already past)\n\
     \n\
     **Relative**\n\
     • `30分後` / `+30m`\n\
     • `1時間後` / `+1h`\n\
     • `2時間30分後` / `+2h30m`\n\
     • `3日後` / `+3d`"
}

fn later<Tz: TimeZone>(now: &DateTime<Tz>, delta: Duration) -> Option<DateTime<Tz>> {
    now.clone().checked_add_signed(delta)
}

fn ymd(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )
}

/// Wall-clock `date hour:minute` in the timezone of `now`.
fn at_local<Tz: TimeZone>(
    now: &DateTime<Tz>,
    date: NaiveDate,
    hour: i64,
    minute: i64,
) -> Option<DateTime<Tz>> {
    let naive: NaiveDateTime =
        date.and_hms_opt(u32::try_from(hour).ok()?, u32::try_from(minute).ok()?, 0)?;
    // Ambiguous local times (DST fold) resolve to the earlier instant;
    // non-existent ones (DST gap) fail.
    now.timezone().from_local_datetime(&naive).earliest()
}
