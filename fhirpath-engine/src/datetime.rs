// Partial-precision date, datetime and time values
//
// FHIRPath temporal literals carry an explicit precision: `@2012` is a
// year, `@2012-04-15T10:00` a minute. Two values only compare when their
// shared prefix decides the ordering; an equal prefix with differing
// precision is indeterminate and surfaces as empty.

use crate::errors::FhirPathError;
use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

/// A date with year, month or day precision. Unspecified components are
/// stored as their lowest value and never rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

/// A time of day with hour through millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionTime {
    pub time: NaiveTime,
    pub precision: TimePrecision,
}

/// A timestamp with year through millisecond precision and an offset.
/// Timestamps written without an offset are stored as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionDateTime {
    pub datetime: DateTime<FixedOffset>,
    pub precision: DateTimePrecision,
}

fn invalid(what: &str, text: &str) -> FhirPathError {
    FhirPathError::parse(0, format!("invalid {} '{}'", what, text))
}

impl PrecisionDate {
    pub fn new(date: NaiveDate, precision: DatePrecision) -> Self {
        PrecisionDate { date, precision }
    }

    /// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub fn parse(text: &str) -> Result<Self, FhirPathError> {
        let mut parts = text.splitn(3, '-');
        let year: i32 = parts
            .next()
            .filter(|y| y.len() == 4)
            .and_then(|y| y.parse().ok())
            .ok_or_else(|| invalid("date", text))?;

        let (month, precision) = match parts.next() {
            None => (1, DatePrecision::Year),
            Some(m) => (
                m.parse::<u32>().ok().filter(|_| m.len() == 2).ok_or_else(|| invalid("date", text))?,
                DatePrecision::Month,
            ),
        };
        let (day, precision) = match parts.next() {
            None => (1, precision),
            Some(d) => (
                d.parse::<u32>().ok().filter(|_| d.len() == 2).ok_or_else(|| invalid("date", text))?,
                DatePrecision::Day,
            ),
        };

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| invalid("date", text))?;
        Ok(PrecisionDate { date, precision })
    }

    /// Widens to a datetime at the same precision (UTC, midnight).
    pub fn to_datetime(self) -> PrecisionDateTime {
        let precision = match self.precision {
            DatePrecision::Year => DateTimePrecision::Year,
            DatePrecision::Month => DateTimePrecision::Month,
            DatePrecision::Day => DateTimePrecision::Day,
        };
        let datetime = utc().from_utc_datetime(&self.date.and_time(NaiveTime::MIN));
        PrecisionDateTime { datetime, precision }
    }

    /// Three-way comparison honouring precision; `None` when the shared
    /// prefix is equal but the precisions differ.
    pub fn compare(&self, other: &PrecisionDate) -> Option<Ordering> {
        let fields = [
            (self.date.year(), other.date.year(), DatePrecision::Year),
            (
                self.date.month() as i32,
                other.date.month() as i32,
                DatePrecision::Month,
            ),
            (
                self.date.day() as i32,
                other.date.day() as i32,
                DatePrecision::Day,
            ),
        ];
        compare_fields(&fields, self.precision, other.precision)
    }

    /// Shifts by a whole number of calendar units.
    pub fn add_calendar(&self, amount: i64, unit: CalendarUnit) -> Option<PrecisionDate> {
        let date = add_calendar_to_date(self.date, amount, unit)?;
        Some(PrecisionDate {
            date,
            precision: self.precision,
        })
    }
}

impl fmt::Display for PrecisionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Year => write!(f, "{}", self.date.format("%Y")),
            DatePrecision::Month => write!(f, "{}", self.date.format("%Y-%m")),
            DatePrecision::Day => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

impl PrecisionTime {
    pub fn new(time: NaiveTime, precision: TimePrecision) -> Self {
        PrecisionTime { time, precision }
    }

    /// Parses `hh`, `hh:mm`, `hh:mm:ss` or `hh:mm:ss.fff`.
    pub fn parse(text: &str) -> Result<Self, FhirPathError> {
        let (hms, fraction) = match text.split_once('.') {
            Some((hms, frac)) => (hms, Some(frac)),
            None => (text, None),
        };

        let mut parts = hms.splitn(3, ':');
        let hour: u32 = parts
            .next()
            .filter(|h| h.len() == 2)
            .and_then(|h| h.parse().ok())
            .ok_or_else(|| invalid("time", text))?;

        let (minute, precision) = match parts.next() {
            None => (0, TimePrecision::Hour),
            Some(m) => (
                m.parse::<u32>().ok().filter(|_| m.len() == 2).ok_or_else(|| invalid("time", text))?,
                TimePrecision::Minute,
            ),
        };
        let (second, precision) = match parts.next() {
            None => (0, precision),
            Some(s) => (
                s.parse::<u32>().ok().filter(|_| s.len() == 2).ok_or_else(|| invalid("time", text))?,
                TimePrecision::Second,
            ),
        };

        let (milli, precision) = match fraction {
            None => (0, precision),
            Some(frac) if precision == TimePrecision::Second => {
                let digits: String = frac.chars().take(3).collect();
                let mut value: u32 = digits.parse().map_err(|_| invalid("time", text))?;
                for _ in digits.len()..3 {
                    value *= 10;
                }
                (value, TimePrecision::Millisecond)
            }
            Some(_) => return Err(invalid("time", text)),
        };

        let time = NaiveTime::from_hms_milli_opt(hour, minute, second, milli)
            .ok_or_else(|| invalid("time", text))?;
        Ok(PrecisionTime { time, precision })
    }

    pub fn compare(&self, other: &PrecisionTime) -> Option<Ordering> {
        let fields = [
            (
                self.time.hour() as i32,
                other.time.hour() as i32,
                TimePrecision::Hour,
            ),
            (
                self.time.minute() as i32,
                other.time.minute() as i32,
                TimePrecision::Minute,
            ),
            (
                self.time.second() as i32,
                other.time.second() as i32,
                TimePrecision::Second,
            ),
            (
                (self.time.nanosecond() / 1_000_000) as i32,
                (other.time.nanosecond() / 1_000_000) as i32,
                TimePrecision::Millisecond,
            ),
        ];
        compare_fields(&fields, self.precision, other.precision)
    }
}

impl fmt::Display for PrecisionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            TimePrecision::Hour => write!(f, "{}", self.time.format("%H")),
            TimePrecision::Minute => write!(f, "{}", self.time.format("%H:%M")),
            TimePrecision::Second => write!(f, "{}", self.time.format("%H:%M:%S")),
            TimePrecision::Millisecond => write!(f, "{}", self.time.format("%H:%M:%S%.3f")),
        }
    }
}

impl PrecisionDateTime {
    pub fn new(datetime: DateTime<FixedOffset>, precision: DateTimePrecision) -> Self {
        PrecisionDateTime { datetime, precision }
    }

    /// Parses `YYYY-MM-DDThh[:mm[:ss[.fff]]][Z|±hh:mm]`. The time part may
    /// be absent entirely (`@2012-04-15T`).
    pub fn parse(text: &str) -> Result<Self, FhirPathError> {
        let (date_part, rest) = text.split_once('T').ok_or_else(|| invalid("dateTime", text))?;

        let date = PrecisionDate::parse(date_part)?;
        if date.precision != DatePrecision::Day && !rest.is_empty() {
            return Err(invalid("dateTime", text));
        }

        let (time_part, offset) = split_offset(rest);
        let offset = match offset {
            Some(tz) => parse_offset(tz).ok_or_else(|| invalid("dateTime", text))?,
            None => utc(),
        };

        let (time, precision) = if time_part.is_empty() {
            (
                NaiveTime::MIN,
                match date.precision {
                    DatePrecision::Year => DateTimePrecision::Year,
                    DatePrecision::Month => DateTimePrecision::Month,
                    DatePrecision::Day => DateTimePrecision::Day,
                },
            )
        } else {
            let time = PrecisionTime::parse(time_part)?;
            (
                time.time,
                match time.precision {
                    TimePrecision::Hour => DateTimePrecision::Hour,
                    TimePrecision::Minute => DateTimePrecision::Minute,
                    TimePrecision::Second => DateTimePrecision::Second,
                    TimePrecision::Millisecond => DateTimePrecision::Millisecond,
                },
            )
        };

        let naive = NaiveDateTime::new(date.date, time);
        let datetime = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| invalid("dateTime", text))?;
        Ok(PrecisionDateTime { datetime, precision })
    }

    /// Truncates to date precision, dropping the time component.
    pub fn to_date(self) -> PrecisionDate {
        let precision = match self.precision {
            DateTimePrecision::Year => DatePrecision::Year,
            DateTimePrecision::Month => DatePrecision::Month,
            _ => DatePrecision::Day,
        };
        PrecisionDate {
            date: self.datetime.date_naive(),
            precision,
        }
    }

    /// Comparison on the UTC timeline, truncated to the coarser of the two
    /// precisions; equality at differing precision is indeterminate.
    pub fn compare(&self, other: &PrecisionDateTime) -> Option<Ordering> {
        let precision = self.precision.min(other.precision);
        let left = truncate_utc(&self.datetime, precision);
        let right = truncate_utc(&other.datetime, precision);
        match left.cmp(&right) {
            Ordering::Equal if self.precision != other.precision => None,
            ordering => Some(ordering),
        }
    }

    pub fn add_calendar(&self, amount: i64, unit: CalendarUnit) -> Option<PrecisionDateTime> {
        let datetime = match unit {
            CalendarUnit::Year | CalendarUnit::Month | CalendarUnit::Week | CalendarUnit::Day => {
                let date = add_calendar_to_date(self.datetime.date_naive(), amount, unit)?;
                let naive = NaiveDateTime::new(date, self.datetime.time());
                self.datetime.offset().from_local_datetime(&naive).single()?
            }
            CalendarUnit::Hour => self.datetime.checked_add_signed(chrono::Duration::hours(amount))?,
            CalendarUnit::Minute => self
                .datetime
                .checked_add_signed(chrono::Duration::minutes(amount))?,
            CalendarUnit::Second => self
                .datetime
                .checked_add_signed(chrono::Duration::seconds(amount))?,
            CalendarUnit::Millisecond => self
                .datetime
                .checked_add_signed(chrono::Duration::milliseconds(amount))?,
        };
        Some(PrecisionDateTime {
            datetime,
            precision: self.precision,
        })
    }
}

impl fmt::Display for PrecisionDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = &self.datetime;
        let offset = if dt.offset().local_minus_utc() == 0 {
            "Z".to_string()
        } else {
            dt.format("%:z").to_string()
        };
        match self.precision {
            DateTimePrecision::Year => write!(f, "{}", dt.format("%Y")),
            DateTimePrecision::Month => write!(f, "{}", dt.format("%Y-%m")),
            DateTimePrecision::Day => write!(f, "{}", dt.format("%Y-%m-%d")),
            DateTimePrecision::Hour => write!(f, "{}{}", dt.format("%Y-%m-%dT%H"), offset),
            DateTimePrecision::Minute => write!(f, "{}{}", dt.format("%Y-%m-%dT%H:%M"), offset),
            DateTimePrecision::Second => write!(f, "{}{}", dt.format("%Y-%m-%dT%H:%M:%S"), offset),
            DateTimePrecision::Millisecond => {
                write!(f, "{}{}", dt.format("%Y-%m-%dT%H:%M:%S%.3f"), offset)
            }
        }
    }
}

/// Calendar and UCUM time-valued units accepted in temporal arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl CalendarUnit {
    /// Maps calendar words (singular and plural) and UCUM codes.
    pub fn parse(unit: &str) -> Option<CalendarUnit> {
        match unit {
            "year" | "years" | "a" => Some(CalendarUnit::Year),
            "month" | "months" | "mo" => Some(CalendarUnit::Month),
            "week" | "weeks" | "wk" => Some(CalendarUnit::Week),
            "day" | "days" | "d" => Some(CalendarUnit::Day),
            "hour" | "hours" | "h" => Some(CalendarUnit::Hour),
            "minute" | "minutes" | "min" => Some(CalendarUnit::Minute),
            "second" | "seconds" | "s" => Some(CalendarUnit::Second),
            "millisecond" | "milliseconds" | "ms" => Some(CalendarUnit::Millisecond),
            _ => None,
        }
    }
}

fn add_calendar_to_date(date: NaiveDate, amount: i64, unit: CalendarUnit) -> Option<NaiveDate> {
    let months = |n: i64| u32::try_from(n.unsigned_abs()).ok().map(Months::new);
    let days = |n: i64| Some(Days::new(n.unsigned_abs()));
    match unit {
        CalendarUnit::Year => {
            let m = months(amount.checked_mul(12)?)?;
            if amount >= 0 {
                date.checked_add_months(m)
            } else {
                date.checked_sub_months(m)
            }
        }
        CalendarUnit::Month => {
            let m = months(amount)?;
            if amount >= 0 {
                date.checked_add_months(m)
            } else {
                date.checked_sub_months(m)
            }
        }
        CalendarUnit::Week => {
            let d = days(amount.checked_mul(7)?)?;
            if amount >= 0 {
                date.checked_add_days(d)
            } else {
                date.checked_sub_days(d)
            }
        }
        CalendarUnit::Day => {
            let d = days(amount)?;
            if amount >= 0 {
                date.checked_add_days(d)
            } else {
                date.checked_sub_days(d)
            }
        }
        _ => None,
    }
}

fn compare_fields<P: PartialOrd + Copy>(
    fields: &[(i32, i32, P)],
    left_precision: P,
    right_precision: P,
) -> Option<Ordering> {
    for (left, right, precision) in fields {
        let left_has = left_precision >= *precision;
        let right_has = right_precision >= *precision;
        match (left_has, right_has) {
            (true, true) => match left.cmp(right) {
                Ordering::Equal => continue,
                ordering => return Some(ordering),
            },
            (false, false) => return Some(Ordering::Equal),
            // shared prefix equal, precisions diverge
            _ => return None,
        }
    }
    Some(Ordering::Equal)
}

fn truncate_utc(datetime: &DateTime<FixedOffset>, precision: DateTimePrecision) -> i64 {
    let utc = datetime.naive_utc();
    match precision {
        DateTimePrecision::Year => utc.year() as i64,
        DateTimePrecision::Month => utc.year() as i64 * 12 + utc.month() as i64,
        DateTimePrecision::Day => utc.and_utc().timestamp() / 86_400,
        DateTimePrecision::Hour => utc.and_utc().timestamp() / 3_600,
        DateTimePrecision::Minute => utc.and_utc().timestamp() / 60,
        DateTimePrecision::Second => utc.and_utc().timestamp(),
        DateTimePrecision::Millisecond => utc.and_utc().timestamp_millis(),
    }
}

fn split_offset(rest: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return (stripped, Some("Z"));
    }
    for (i, c) in rest.char_indices() {
        if c == '+' || (c == '-' && i > 0) {
            return (&rest[..i], Some(&rest[i..]));
        }
    }
    (rest, None)
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    if tz == "Z" {
        return Some(utc());
    }
    let sign = match tz.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let (hours, minutes) = tz[1..].split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_dates() {
        let year = PrecisionDate::parse("2012").unwrap();
        assert_eq!(year.precision, DatePrecision::Year);
        assert_eq!(year.to_string(), "2012");

        let month = PrecisionDate::parse("2012-04").unwrap();
        assert_eq!(month.precision, DatePrecision::Month);
        assert_eq!(month.to_string(), "2012-04");

        let day = PrecisionDate::parse("2012-04-15").unwrap();
        assert_eq!(day.precision, DatePrecision::Day);
        assert_eq!(day.to_string(), "2012-04-15");
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(PrecisionDate::parse("12").is_err());
        assert!(PrecisionDate::parse("2012-13").is_err());
        assert!(PrecisionDate::parse("2012-02-30").is_err());
    }

    #[test]
    fn date_comparison_honours_precision() {
        let year = PrecisionDate::parse("2012").unwrap();
        let month = PrecisionDate::parse("2012-04").unwrap();
        let later = PrecisionDate::parse("2013").unwrap();

        assert_eq!(year.compare(&month), None);
        assert_eq!(year.compare(&later), Some(Ordering::Less));
        assert_eq!(month.compare(&month), Some(Ordering::Equal));
    }

    #[test]
    fn parses_time_with_fraction() {
        let time = PrecisionTime::parse("19:30:05.1").unwrap();
        assert_eq!(time.precision, TimePrecision::Millisecond);
        assert_eq!(time.to_string(), "19:30:05.100");
    }

    #[test]
    fn parses_datetime_with_offset() {
        let dt = PrecisionDateTime::parse("2010-02-12T12:30:34.002Z").unwrap();
        assert_eq!(dt.precision, DateTimePrecision::Millisecond);
        assert_eq!(dt.to_string(), "2010-02-12T12:30:34.002Z");

        let offset = PrecisionDateTime::parse("2006-01-02T15:04:05-05:00").unwrap();
        assert_eq!(offset.to_string(), "2006-01-02T15:04:05-05:00");
    }

    #[test]
    fn datetime_comparison_across_offsets() {
        let utc = PrecisionDateTime::parse("2012-04-15T10:00:00Z").unwrap();
        let shifted = PrecisionDateTime::parse("2012-04-15T12:00:00+02:00").unwrap();
        assert_eq!(utc.compare(&shifted), Some(Ordering::Equal));
    }

    #[test]
    fn calendar_arithmetic() {
        let date = PrecisionDate::parse("2012-01-31").unwrap();
        let plus = date.add_calendar(1, CalendarUnit::Month).unwrap();
        assert_eq!(plus.to_string(), "2012-02-29");

        let dt = PrecisionDateTime::parse("2012-04-15T10:00:00Z").unwrap();
        let plus = dt.add_calendar(90, CalendarUnit::Minute).unwrap();
        assert_eq!(plus.to_string(), "2012-04-15T11:30:00Z");
    }
}
