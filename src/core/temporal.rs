//! Calendar-granularity instants and spans
//!
//! A [`TimeInstant`] is a calendar point whose precision is whatever fields
//! are set: a year, a year and month, or a full date. Two sentinels bound
//! the axis on either side. A [`TimeSpan`] is a begin instant plus either a
//! fixed [`SpanDuration`], an explicit end, or nothing (open until
//! dooms-day).
//!
//! Comparisons between instants of different precision are *fuzzy*: two
//! instants unify when every field present in both is equal. Span
//! containment treats unifying boundaries as inclusive.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Calendar fields of an instant. Months are zero based (0 = January).
///
/// Field presence is hierarchical: a month needs a year and a day needs a
/// month. An absent field orders before every present value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarPoint {
    year: Option<i32>,
    month: Option<u8>,
    day: Option<u8>,
}

impl CalendarPoint {
    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u8> {
        self.month
    }

    pub fn day(&self) -> Option<u8> {
        self.day
    }

    fn can_unify(&self, other: &CalendarPoint) -> bool {
        fn agrees<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        agrees(self.year, other.year) && agrees(self.month, other.month) && agrees(self.day, other.day)
    }
}

/// A point on the calendar axis, or one of its two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeInstant {
    /// Negative infinity
    BigBang,
    /// A calendar point of year, month or day precision
    Calendar(CalendarPoint),
    /// Positive infinity
    DoomsDay,
}

fn check_month(month: u8) -> Result<u8> {
    if month > 11 {
        return Err(Error::Validation(format!(
            "month {month} out of range (expected 0..=11)"
        )));
    }
    Ok(month)
}

fn check_day(day: u8) -> Result<u8> {
    if day == 0 || day > 31 {
        return Err(Error::Validation(format!(
            "day {day} out of range (expected 1..=31)"
        )));
    }
    Ok(day)
}

impl TimeInstant {
    /// An instant with no fields set; unifies with every calendar point.
    pub fn unspecified() -> Self {
        Self::Calendar(CalendarPoint::default())
    }

    /// Year precision
    pub fn from_year(year: i32) -> Self {
        Self::Calendar(CalendarPoint {
            year: Some(year),
            month: None,
            day: None,
        })
    }

    /// Month precision; `month` is zero based
    pub fn from_year_month(year: i32, month: u8) -> Result<Self> {
        Ok(Self::Calendar(CalendarPoint {
            year: Some(year),
            month: Some(check_month(month)?),
            day: None,
        }))
    }

    /// Day precision; `month` is zero based, `day` is one based
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self> {
        Ok(Self::Calendar(CalendarPoint {
            year: Some(year),
            month: Some(check_month(month)?),
            day: Some(check_day(day)?),
        }))
    }

    /// Today's date in UTC
    pub fn today() -> Self {
        Self::from(Utc::now().date_naive())
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            Self::Calendar(point) => point.year,
            _ => None,
        }
    }

    pub fn month(&self) -> Option<u8> {
        match self {
            Self::Calendar(point) => point.month,
            _ => None,
        }
    }

    pub fn day(&self) -> Option<u8> {
        match self {
            Self::Calendar(point) => point.day,
            _ => None,
        }
    }

    /// Replace the year, keeping finer fields. Sentinels become year-precision points.
    pub fn with_year(self, year: i32) -> Self {
        match self {
            Self::Calendar(point) => Self::Calendar(CalendarPoint {
                year: Some(year),
                ..point
            }),
            _ => Self::from_year(year),
        }
    }

    /// Set or clear the month. Clearing the month also clears the day.
    pub fn with_month(self, month: Option<u8>) -> Result<Self> {
        let point = self.calendar_point("month")?;
        match month {
            None => Ok(Self::Calendar(CalendarPoint {
                month: None,
                day: None,
                ..point
            })),
            Some(month) => {
                if point.year.is_none() {
                    return Err(Error::Validation(
                        "cannot set a month on an instant without a year".to_string(),
                    ));
                }
                Ok(Self::Calendar(CalendarPoint {
                    month: Some(check_month(month)?),
                    ..point
                }))
            }
        }
    }

    /// Set or clear the day.
    pub fn with_day(self, day: Option<u8>) -> Result<Self> {
        let point = self.calendar_point("day")?;
        match day {
            None => Ok(Self::Calendar(CalendarPoint { day: None, ..point })),
            Some(day) => {
                if point.month.is_none() {
                    return Err(Error::Validation(
                        "cannot set a day on an instant without a month".to_string(),
                    ));
                }
                Ok(Self::Calendar(CalendarPoint {
                    day: Some(check_day(day)?),
                    ..point
                }))
            }
        }
    }

    fn calendar_point(&self, field: &str) -> Result<CalendarPoint> {
        match self {
            Self::Calendar(point) => Ok(*point),
            other => Err(Error::Validation(format!(
                "cannot set the {field} of {other}"
            ))),
        }
    }

    pub fn is_big_bang(&self) -> bool {
        matches!(self, Self::BigBang)
    }

    pub fn is_dooms_day(&self) -> bool {
        matches!(self, Self::DoomsDay)
    }

    /// Fuzzy equality: every field present in both instants is equal.
    /// Sentinels only unify with themselves.
    pub fn can_unify(&self, other: &TimeInstant) -> bool {
        match (self, other) {
            (Self::Calendar(a), Self::Calendar(b)) => a.can_unify(b),
            (a, b) => a == b,
        }
    }

    /// `self` is strictly before `other`, or the two unify.
    pub fn at_or_before(&self, other: &TimeInstant) -> bool {
        self < other || self.can_unify(other)
    }

    /// `self` is strictly after `other` and does not unify with it.
    pub fn strictly_after(&self, other: &TimeInstant) -> bool {
        !self.at_or_before(other)
    }

    /// Full-date instants convert to a [`NaiveDate`]; coarser ones do not.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Calendar(CalendarPoint {
                year: Some(year),
                month: Some(month),
                day: Some(day),
            }) => NaiveDate::from_ymd_opt(*year, u32::from(*month) + 1, u32::from(*day)),
            _ => None,
        }
    }
}

impl From<NaiveDate> for TimeInstant {
    fn from(date: NaiveDate) -> Self {
        Self::Calendar(CalendarPoint {
            year: Some(date.year()),
            month: Some(date.month0() as u8),
            day: Some(date.day() as u8),
        })
    }
}

impl fmt::Display for TimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigBang => write!(f, "big-bang"),
            Self::DoomsDay => write!(f, "dooms-day"),
            Self::Calendar(point) => {
                let Some(year) = point.year else {
                    return write!(f, "*");
                };
                if year < 0 {
                    write!(f, "-{:04}", year.unsigned_abs())?;
                } else {
                    write!(f, "{year:04}")?;
                }
                if let Some(month) = point.month {
                    write!(f, "-{:02}", month + 1)?;
                }
                if let Some(day) = point.day {
                    write!(f, "-{day:02}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for TimeInstant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "big-bang" => return Ok(Self::BigBang),
            "dooms-day" => return Ok(Self::DoomsDay),
            "*" => return Ok(Self::unspecified()),
            _ => {}
        }

        let bad = || Error::Validation(format!("malformed instant: {s:?}"));
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let parts: Vec<&str> = rest.split('-').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(bad());
        }
        let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !parts.iter().all(|part| numeric(part)) {
            return Err(bad());
        }

        let year: i32 = parts[0].parse().map_err(|_| bad())?;
        let mut instant = Self::from_year(if negative { -year } else { year });
        if let Some(month) = parts.get(1) {
            let month: u8 = month.parse().map_err(|_| bad())?;
            if month == 0 {
                return Err(bad());
            }
            instant = instant.with_month(Some(month - 1))?;
        }
        if let Some(day) = parts.get(2) {
            let day: u8 = day.parse().map_err(|_| bad())?;
            instant = instant.with_day(Some(day))?;
        }
        Ok(instant)
    }
}

impl TryFrom<String> for TimeInstant {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeInstant> for String {
    fn from(instant: TimeInstant) -> Self {
        instant.to_string()
    }
}

// ---------------------------------------------------------------------------
// Calendar arithmetic
// ---------------------------------------------------------------------------

fn outside_calendar(year: i64) -> Error {
    Error::Validation(format!("year {year} is outside the supported calendar range"))
}

/// Day ordinal of `day` within `(year, month0)`. Days past the end of the
/// month roll forward into the following months.
fn day_number(year: i64, month0: u8, day: u8) -> Result<i64> {
    let first = i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, u32::from(month0) + 1, 1))
        .ok_or_else(|| outside_calendar(year))?;
    Ok(i64::from(first.num_days_from_ce()) + i64::from(day) - 1)
}

fn date_from_day_number(n: i64) -> Result<NaiveDate> {
    i32::try_from(n)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::Validation(format!("day ordinal {n} is outside the supported calendar range")))
}

/// Number of days in a zero-based month, leap years included.
pub fn days_in_month(year: i32, month0: u8) -> Result<u8> {
    let month0 = check_month(month0)?;
    let this = day_number(i64::from(year), month0, 1)?;
    let next = if month0 == 11 {
        day_number(i64::from(year) + 1, 0, 1)?
    } else {
        day_number(i64::from(year), month0 + 1, 1)?
    };
    Ok((next - this) as u8)
}

fn shift_months(year: i64, month0: u8, months: i64) -> (i64, u8) {
    let total = year * 12 + i64::from(month0) + months;
    (total.div_euclid(12), total.rem_euclid(12) as u8)
}

// ---------------------------------------------------------------------------
// Durations and spans
// ---------------------------------------------------------------------------

/// A fixed calendar duration. Unset fields carry the granularity of the
/// span they belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanDuration {
    years: Option<u32>,
    months: Option<u8>,
    days: Option<u8>,
}

impl SpanDuration {
    /// Months must be below 12 and days below 31.
    pub fn new(years: Option<u32>, months: Option<u8>, days: Option<u8>) -> Result<Self> {
        if let Some(months) = months {
            if months >= 12 {
                return Err(Error::Validation(format!(
                    "duration months {months} out of range (expected < 12)"
                )));
            }
        }
        if let Some(days) = days {
            if days >= 31 {
                return Err(Error::Validation(format!(
                    "duration days {days} out of range (expected < 31)"
                )));
            }
        }
        Ok(Self { years, months, days })
    }

    pub fn from_years(years: u32) -> Self {
        Self {
            years: Some(years),
            months: None,
            days: None,
        }
    }

    pub fn years(&self) -> Option<u32> {
        self.years
    }

    pub fn months(&self) -> Option<u8> {
        self.months
    }

    pub fn days(&self) -> Option<u8> {
        self.days
    }

    /// Add this duration to a calendar point, month overflow first, then days.
    fn add_to(&self, begin: CalendarPoint) -> Result<TimeInstant> {
        let year = begin.year.ok_or_else(|| {
            Error::Validation("a span with a duration needs a begin with a year".to_string())
        })?;
        let extra_days = self.days.unwrap_or(0);
        let extra_months = self.months.unwrap_or(0);
        let want_day = begin.day.is_some() || extra_days > 0;
        let want_month = want_day || begin.month.is_some() || extra_months > 0;

        let months = i64::from(self.years.unwrap_or(0)) * 12 + i64::from(extra_months);
        let (y, m) = shift_months(i64::from(year), begin.month.unwrap_or(0), months);
        let to_year = |y: i64| i32::try_from(y).map_err(|_| outside_calendar(y));

        if !want_month {
            return Ok(TimeInstant::from_year(to_year(y)?));
        }
        if !want_day {
            return TimeInstant::from_year_month(to_year(y)?, m);
        }
        let n = day_number(y, m, begin.day.unwrap_or(1))? + i64::from(extra_days);
        Ok(TimeInstant::from(date_from_day_number(n)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    /// Until dooms-day
    Open,
    /// begin + duration
    Fixed(SpanDuration),
    /// Explicit end instant
    Until,
}

/// An interval of time: a begin instant and an extent.
///
/// Equality, hashing and ordering use the denoted `(begin, end)` pair, so
/// the begin/end form and its canonical begin+duration form are the same key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSpan {
    begin: TimeInstant,
    extent: Extent,
    end: TimeInstant,
}

impl TimeSpan {
    /// `[big-bang, dooms-day)`
    pub fn universal() -> Self {
        Self {
            begin: TimeInstant::BigBang,
            extent: Extent::Open,
            end: TimeInstant::DoomsDay,
        }
    }

    /// A span from `begin` until dooms-day.
    pub fn open(begin: TimeInstant) -> Result<Self> {
        if begin.is_dooms_day() {
            return Err(Error::Validation(
                "a span cannot begin at dooms-day".to_string(),
            ));
        }
        Ok(Self {
            begin,
            extent: Extent::Open,
            end: TimeInstant::DoomsDay,
        })
    }

    /// A span of `begin` plus `duration`; no duration means open-ended.
    pub fn new(begin: TimeInstant, duration: Option<SpanDuration>) -> Result<Self> {
        let Some(duration) = duration else {
            return Self::open(begin);
        };
        let TimeInstant::Calendar(point) = begin else {
            return Err(Error::Validation(format!(
                "a fixed duration cannot start at {begin}"
            )));
        };
        let end = duration.add_to(point)?;
        if end <= begin {
            return Err(Error::Validation(format!(
                "span begin {begin} is not before its end {end}"
            )));
        }
        Ok(Self {
            begin,
            extent: Extent::Fixed(duration),
            end,
        })
    }

    /// A span in begin/end form. A begin and end that unify denote one year.
    pub fn between(begin: TimeInstant, end: TimeInstant) -> Result<Self> {
        if end.is_dooms_day() {
            return Self::open(begin);
        }
        if begin.can_unify(&end) {
            return Self::new(begin, Some(SpanDuration::from_years(1)));
        }
        if begin >= end {
            return Err(Error::Validation(format!(
                "span begin {begin} is not before its end {end}"
            )));
        }
        Ok(Self {
            begin,
            extent: Extent::Until,
            end,
        })
    }

    /// Derive a begin+duration span from two instants. Duration fields finer
    /// than the begin instant's precision are left unset.
    pub fn create_from_instants(begin: TimeInstant, end: TimeInstant) -> Result<Self> {
        if end.is_dooms_day() {
            return Self::open(begin);
        }
        if begin.can_unify(&end) {
            return Self::new(begin, Some(SpanDuration::from_years(1)));
        }
        if begin >= end {
            return Err(Error::Validation(format!(
                "span begin {begin} is not before its end {end}"
            )));
        }
        let (TimeInstant::Calendar(b), TimeInstant::Calendar(e)) = (begin, end) else {
            return Err(Error::Validation(format!(
                "cannot derive a duration between {begin} and {end}"
            )));
        };
        let (Some(by), Some(ey)) = (b.year, e.year) else {
            return Err(Error::Validation(format!(
                "cannot derive a duration between {begin} and {end} without years"
            )));
        };
        let (by, ey) = (i64::from(by), i64::from(ey));
        let to_years = |months: i64| {
            u32::try_from(months / 12).map_err(|_| Error::Validation("duration overflow".to_string()))
        };

        let duration = match (b.month, b.day) {
            (None, _) => SpanDuration {
                years: Some(to_years((ey - by) * 12)?),
                months: None,
                days: None,
            },
            (Some(bm), None) => {
                let months = (ey - by) * 12 + i64::from(e.month.unwrap_or(0)) - i64::from(bm);
                SpanDuration {
                    years: Some(to_years(months)?),
                    months: Some((months % 12) as u8),
                    days: None,
                }
            }
            (Some(bm), Some(bd)) => {
                let target = day_number(ey, e.month.unwrap_or(0), e.day.unwrap_or(1))?;
                let landing = |months: i64| -> Result<i64> {
                    let (y, m) = shift_months(by, bm, months);
                    day_number(y, m, bd)
                };
                let mut months = ((ey - by) * 12 + i64::from(e.month.unwrap_or(0)) - i64::from(bm)).max(0);
                while months > 0 && landing(months)? > target {
                    months -= 1;
                }
                let days = target - landing(months)?;
                SpanDuration {
                    years: Some(to_years(months)?),
                    months: Some((months % 12) as u8),
                    days: Some(days as u8),
                }
            }
        };
        Self::new(begin, Some(duration))
    }

    /// Rewrite a begin/end span into begin+duration form. Spans that cannot
    /// carry a duration (open, universal, starting at big-bang) are returned
    /// as is, and so are spans whose end is finer or coarser than any
    /// duration from their begin can reach, such as `1900/1950-06`.
    pub fn canonicalize(&self) -> Self {
        match self.extent {
            Extent::Until => match Self::create_from_instants(self.begin, self.end) {
                Ok(canonical) if canonical.end == self.end => canonical,
                _ => *self,
            },
            _ => *self,
        }
    }

    pub fn begin(&self) -> TimeInstant {
        self.begin
    }

    pub fn end(&self) -> TimeInstant {
        self.end
    }

    /// The fixed duration, for spans in begin+duration form.
    pub fn duration(&self) -> Option<SpanDuration> {
        match self.extent {
            Extent::Fixed(duration) => Some(duration),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_dooms_day()
    }

    pub fn is_universal(&self) -> bool {
        self.begin.is_big_bang() && self.end.is_dooms_day()
    }

    /// Begin and end are both inclusive under unification.
    pub fn contains(&self, instant: &TimeInstant) -> bool {
        self.begin.at_or_before(instant) && instant.at_or_before(&self.end)
    }

    pub fn contains_span(&self, other: &TimeSpan) -> bool {
        self.begin.at_or_before(&other.begin) && other.end.at_or_before(&self.end)
    }

    /// Spans that merely touch (or whose touching boundaries unify) do not overlap.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        !(self.end.at_or_before(&other.begin) || other.end.at_or_before(&self.begin))
    }

    /// Both boundaries unify with the other span's boundaries.
    pub fn can_unify(&self, other: &TimeSpan) -> bool {
        self.begin.can_unify(&other.begin) && self.end.can_unify(&other.end)
    }
}

impl PartialEq for TimeSpan {
    fn eq(&self, other: &Self) -> bool {
        self.begin == other.begin && self.end == other.end
    }
}

impl Eq for TimeSpan {}

impl Hash for TimeSpan {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.begin.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> Ordering {
        self.begin
            .cmp(&other.begin)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.begin, self.end)
    }
}

impl FromStr for TimeSpan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (begin, end) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::Validation(format!("malformed span: {s:?}")))?;
        let begin: TimeInstant = begin.parse()?;
        let end: TimeInstant = end.parse()?;
        if begin.is_big_bang() && end.is_dooms_day() {
            return Ok(Self::universal());
        }
        Self::between(begin, end)
    }
}

impl TryFrom<String> for TimeSpan {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeSpan> for String {
    fn from(span: TimeSpan) -> Self {
        span.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(s: &str) -> TimeInstant {
        s.parse().unwrap()
    }

    fn span(s: &str) -> TimeSpan {
        s.parse().unwrap()
    }

    #[test]
    fn test_field_validation() {
        assert!(TimeInstant::from_year_month(1900, 12).is_err());
        assert!(TimeInstant::from_ymd(1900, 0, 32).is_err());
        assert!(TimeInstant::from_ymd(1900, 0, 0).is_err());
        assert!(TimeInstant::from_year(1900).with_day(Some(3)).is_err());
        assert!(TimeInstant::BigBang.with_month(Some(1)).is_err());
        assert!(SpanDuration::new(Some(1), Some(12), None).is_err());
        assert!(SpanDuration::new(Some(1), None, Some(31)).is_err());
    }

    #[test]
    fn test_instant_text_form() {
        let date = TimeInstant::from_ymd(1900, 2, 15).unwrap();
        assert_eq!(date.to_string(), "1900-03-15");
        assert_eq!(at("1900-03-15"), date);
        assert_eq!(at("-0044-03").to_string(), "-0044-03");
        assert_eq!(at("big-bang"), TimeInstant::BigBang);
        assert_eq!(at("*"), TimeInstant::unspecified());
        assert!("1900-13".parse::<TimeInstant>().is_err());
        assert!("19x0".parse::<TimeInstant>().is_err());
        assert!("1900-".parse::<TimeInstant>().is_err());
    }

    #[test]
    fn test_unify_and_order() {
        assert!(at("1900").can_unify(&at("1900-05-03")));
        assert!(!at("1900-04").can_unify(&at("1900-05-03")));
        assert!(TimeInstant::unspecified().can_unify(&at("2001-01")));
        assert!(!TimeInstant::DoomsDay.can_unify(&at("2001")));
        assert!(at("1900") < at("1900-01"));
        assert!(TimeInstant::BigBang < at("-9999"));
        assert!(at("9999") < TimeInstant::DoomsDay);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(1900, 1).unwrap(), 28);
        assert_eq!(days_in_month(2000, 1).unwrap(), 29);
        assert_eq!(days_in_month(2024, 1).unwrap(), 29);
        assert_eq!(days_in_month(2023, 11).unwrap(), 31);
        assert_eq!(days_in_month(2023, 3).unwrap(), 30);
    }

    #[test]
    fn test_end_arithmetic() {
        let d = SpanDuration::new(Some(0), Some(1), Some(0)).unwrap();
        let s = TimeSpan::new(at("1900-01-31"), Some(d)).unwrap();
        // February 1900 has 28 days, so the 31st rolls over into March.
        assert_eq!(s.end(), at("1900-03-03"));

        let d = SpanDuration::new(Some(0), Some(0), Some(30)).unwrap();
        let s = TimeSpan::new(at("2000-02-15"), Some(d)).unwrap();
        assert_eq!(s.end(), at("2000-03-16"));

        let s = TimeSpan::new(at("1900"), Some(SpanDuration::from_years(50))).unwrap();
        assert_eq!(s.end(), at("1950"));

        let d = SpanDuration::new(Some(1), Some(11), None).unwrap();
        let s = TimeSpan::new(at("1900-03"), Some(d)).unwrap();
        assert_eq!(s.end(), at("1902-02"));
    }

    #[test]
    fn test_span_construction_rules() {
        assert!(TimeSpan::between(at("1950"), at("1900")).is_err());
        let one_year = TimeSpan::between(at("1900"), at("1900-06")).unwrap();
        assert_eq!(one_year.end(), at("1901"));
        assert!(TimeSpan::between(at("1900"), TimeInstant::DoomsDay).unwrap().is_open());
        assert!(TimeSpan::open(TimeInstant::DoomsDay).is_err());
        assert!(TimeSpan::new(TimeInstant::BigBang, Some(SpanDuration::from_years(1))).is_err());
        assert!(span("big-bang/dooms-day").is_universal());
    }

    #[test]
    fn test_create_from_instants_granularity() {
        let s = TimeSpan::create_from_instants(at("1900"), at("1950-06")).unwrap();
        assert_eq!(s.duration().unwrap().months(), None);
        assert_eq!(s.end(), at("1950"));

        let s = TimeSpan::create_from_instants(at("1900-01-31"), at("1900-03-01")).unwrap();
        let d = s.duration().unwrap();
        assert_eq!((d.years(), d.months(), d.days()), (Some(0), Some(0), Some(29)));
        assert_eq!(s.end(), at("1900-03-01"));
    }

    #[test]
    fn test_containment_and_overlap() {
        let s = span("1900/1950");
        assert!(s.contains(&at("1900")));
        assert!(s.contains(&at("1925-06-01")));
        assert!(s.contains(&at("1950")));
        assert!(!s.contains(&at("1951")));
        assert!(!s.contains(&at("1899-12-31")));

        assert!(s.contains_span(&span("1920/1930")));
        assert!(!s.contains_span(&span("1920/dooms-day")));
        assert!(s.overlaps(&span("1949/1960")));
        assert!(!s.overlaps(&span("1950/1960")));
        assert!(TimeSpan::universal().contains_span(&s));
    }

    #[test]
    fn test_representations_compare_equal() {
        let until = span("1900-02-10/1930-07-01");
        let canonical = until.canonicalize();
        assert!(canonical.duration().is_some());
        assert_eq!(until, canonical);
        assert_eq!(until.to_string(), "1900-02-10/1930-07-01");

        for mixed in ["1900-03-15/1950", "1900/1950-06", "1900-03/1950"] {
            let s = span(mixed);
            let c = s.canonicalize();
            assert_eq!(c, s, "{mixed}");
            assert_eq!(c.end(), s.end(), "{mixed}");
            assert!(c.duration().is_none(), "{mixed}");
        }
        let c = span("1900-03/1950-06").canonicalize();
        assert_eq!(c.end(), at("1950-06"));
        assert!(c.duration().is_some());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let s = span("1900-03/1920");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"1900-03/1920\"");
        let back: TimeSpan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    fn any_instant() -> impl Strategy<Value = TimeInstant> {
        (1i32..3000, prop::option::of(0u8..12), 1u8..=28, any::<bool>()).prop_map(
            |(year, month, day, with_day)| match month {
                None => TimeInstant::from_year(year),
                Some(month) if with_day => TimeInstant::from_ymd(year, month, day).unwrap(),
                Some(month) => TimeInstant::from_year_month(year, month).unwrap(),
            },
        )
    }

    fn any_date() -> impl Strategy<Value = TimeInstant> {
        (1i32..3000, 0u8..12, 1u8..=28).prop_map(|(y, m, d)| TimeInstant::from_ymd(y, m, d).unwrap())
    }

    proptest! {
        #[test]
        fn prop_instant_text_round_trip(year in -9999i32..9999, month in 0u8..12, day in 1u8..=31) {
            for instant in [
                TimeInstant::from_year(year),
                TimeInstant::from_year_month(year, month).unwrap(),
                TimeInstant::from_ymd(year, month, day).unwrap(),
            ] {
                let back: TimeInstant = instant.to_string().parse().unwrap();
                prop_assert_eq!(back, instant);
            }
        }

        #[test]
        fn prop_canonicalize_keeps_bounds(a in any_date(), b in any_date()) {
            prop_assume!(a != b);
            let (a, b) = if a < b { (a, b) } else { (b, a) };
            let s = TimeSpan::between(a, b).unwrap();
            let c = s.canonicalize();
            prop_assert_eq!(c.begin(), s.begin());
            prop_assert_eq!(c.end(), s.end());
        }

        #[test]
        fn prop_canonicalize_never_moves_mixed_bounds(a in any_instant(), b in any_instant()) {
            prop_assume!(a < b && !a.can_unify(&b));
            let s = TimeSpan::between(a, b).unwrap();
            let c = s.canonicalize();
            prop_assert_eq!(c, s);
            prop_assert_eq!(c.begin(), a);
            prop_assert_eq!(c.end(), b);
        }

        #[test]
        fn prop_created_span_contains_its_instants(a in any_instant(), b in any_instant()) {
            prop_assume!(a < b && !a.can_unify(&b));
            let s = TimeSpan::create_from_instants(a, b).unwrap();
            prop_assert!(s.contains(&a));
            prop_assert!(s.contains(&b));
            prop_assert!(s.begin().can_unify(&a));
            prop_assert!(s.end().can_unify(&b));
        }
    }
}
