//! Timestamp normalization for node readings.
//!
//! Nodes report their sync time as a raw string in one of two encodings:
//!
//! - `DD-MM-YY HH:MM:SS` (or a four-digit year), the format written by the
//!   node firmware. A two-digit year `YY` means `2000 + YY`. The wall-clock
//!   value is interpreted in the UTC offset of the `now` passed in.
//! - Any standard date/time encoding: RFC 3339, RFC 2822, ISO 8601, a bare
//!   `YYYY-MM-DD` date (midnight UTC), or `YYYY-MM-DD HH:MM:SS` without an
//!   offset (interpreted like the first format).
//!
//! [`normalize`] turns either into display strings plus a coarse relative-age
//! label. Unparseable input is not an error: the raw string is returned as
//! the date with an "invalid format" label.
//!
//! # Example
//!
//! ```
//! use nodewatch_core::timestamp::normalize;
//! use time::macros::datetime;
//!
//! let now = datetime!(2024-06-01 10:30:00 UTC);
//! let ts = normalize("01-06-24 10:00:00", now);
//!
//! assert_eq!(ts.date, "01 Jun 2024");
//! assert_eq!(ts.time, "10:00 AM");
//! assert_eq!(ts.relative, "30 min ago");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Language used for date and relative-age labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Locale {
    fn month_abbrev(self, month: Month) -> &'static str {
        const EN: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        const ES: [&str; 12] = [
            "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
        ];
        let index = month as usize - 1;
        match self {
            Locale::English => EN[index],
            Locale::Spanish => ES[index],
        }
    }

    fn meridiem(self, hour: u8) -> &'static str {
        match (self, hour < 12) {
            (Locale::English, true) => "AM",
            (Locale::English, false) => "PM",
            (Locale::Spanish, true) => "a. m.",
            (Locale::Spanish, false) => "p. m.",
        }
    }

    /// Label shown in place of a relative age when the timestamp is unreadable.
    pub fn invalid_format_label(self) -> &'static str {
        match self {
            Locale::English => "invalid format",
            Locale::Spanish => "Formato no válido",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::English => write!(f, "en"),
            Locale::Spanish => write!(f, "es"),
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Ok(Locale::English),
            "es" | "spanish" | "español" => Ok(Locale::Spanish),
            _ => Err(format!("unknown locale '{}', expected 'en' or 'es'", s)),
        }
    }
}

/// Coarse bucket describing how long ago a timestamp occurred.
///
/// Variants are ordered from most to least recent, so comparing two ages
/// compares their recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RelativeAge {
    /// Less than a minute ago, or in the future.
    JustNow,
    /// 1 to 59 minutes.
    Minutes(i64),
    /// 1 to 23 hours.
    Hours(i64),
    /// 1 to 6 days.
    Days(i64),
    /// Seven days or more.
    OverAWeek,
}

impl RelativeAge {
    /// Bucket the gap between `instant` and `now`.
    ///
    /// Instants after `now` land in [`RelativeAge::JustNow`]. This is a known
    /// approximation for nodes whose clock runs ahead.
    pub fn between(instant: OffsetDateTime, now: OffsetDateTime) -> Self {
        let diff = now - instant;

        let minutes = diff.whole_minutes();
        if minutes < 1 {
            return RelativeAge::JustNow;
        }
        if minutes < 60 {
            return RelativeAge::Minutes(minutes);
        }

        let hours = diff.whole_hours();
        if hours < 24 {
            return RelativeAge::Hours(hours);
        }

        let days = diff.whole_days();
        if days < 7 {
            RelativeAge::Days(days)
        } else {
            RelativeAge::OverAWeek
        }
    }

    /// Human-readable label in the given locale.
    pub fn label(&self, locale: Locale) -> String {
        match (self, locale) {
            (RelativeAge::JustNow, Locale::English) => "just now".to_string(),
            (RelativeAge::Minutes(n), Locale::English) => format!("{} min ago", n),
            (RelativeAge::Hours(n), Locale::English) => format!("{} h ago", n),
            (RelativeAge::Days(n), Locale::English) => format!("{} days ago", n),
            (RelativeAge::OverAWeek, Locale::English) => "more than a week ago".to_string(),
            (RelativeAge::JustNow, Locale::Spanish) => "Hace un momento".to_string(),
            (RelativeAge::Minutes(n), Locale::Spanish) => format!("Hace {} min", n),
            (RelativeAge::Hours(n), Locale::Spanish) => format!("Hace {}h", n),
            (RelativeAge::Days(n), Locale::Spanish) => format!("Hace {} días", n),
            (RelativeAge::OverAWeek, Locale::Spanish) => "Hace más de una semana".to_string(),
        }
    }
}

/// Display-ready form of a raw node timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTimestamp {
    /// Localized date, e.g. `01 Jun 2024`. The raw input when unparseable.
    pub date: String,
    /// Localized 12-hour time, e.g. `10:00 AM`. Empty when unparseable.
    pub time: String,
    /// Relative-age label, e.g. `5 min ago`, or the invalid-format marker.
    pub relative: String,
    /// The bucket behind `relative`; `None` when unparseable.
    #[serde(skip)]
    pub age: Option<RelativeAge>,
}

impl NormalizedTimestamp {
    /// Whether the raw timestamp could be parsed.
    pub fn is_valid(&self) -> bool {
        self.age.is_some()
    }
}

/// Normalize a raw timestamp with English labels.
pub fn normalize(raw: &str, now: OffsetDateTime) -> NormalizedTimestamp {
    normalize_with(raw, now, Locale::English)
}

/// Normalize a raw timestamp with labels in `locale`.
///
/// Dates and times are rendered in `now`'s UTC offset.
pub fn normalize_with(raw: &str, now: OffsetDateTime, locale: Locale) -> NormalizedTimestamp {
    let parsed = parse_timestamp(raw, now.offset())
        .and_then(|instant| Some((instant, instant.checked_to_offset(now.offset())?)));
    let Some((instant, local)) = parsed else {
        return NormalizedTimestamp {
            date: raw.to_string(),
            time: String::new(),
            relative: locale.invalid_format_label().to_string(),
            age: None,
        };
    };

    let age = RelativeAge::between(instant, now);

    NormalizedTimestamp {
        date: format_date(local, locale),
        time: format_time(local, locale),
        relative: age.label(locale),
        age: Some(age),
    }
}

/// The current time in the host's local offset, falling back to UTC.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Parse a raw timestamp into an instant.
///
/// The day-first node format is tried first when the input contains a
/// space; everything else, including day-first input that fails to parse,
/// goes through the standard encodings. Timestamps without an explicit
/// offset are interpreted in `offset`.
pub fn parse_timestamp(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.contains(' ')
        && let Some(instant) = parse_day_first(raw, offset)
    {
        return Some(instant);
    }

    parse_standard(raw, offset)
}

/// Parse `DD-MM-YY HH:MM:SS` / `DD-MM-YYYY HH:MM:SS`.
fn parse_day_first(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let (date_part, time_part) = raw.split_once(' ')?;

    let mut date_fields = date_part.split('-');
    let day: u8 = date_fields.next()?.parse().ok()?;
    let month: u8 = date_fields.next()?.parse().ok()?;
    let year_str = date_fields.next()?;
    if date_fields.next().is_some() {
        return None;
    }
    let year: i32 = year_str.parse().ok()?;
    let year = if year_str.len() == 2 { 2000 + year } else { year };

    let mut time_fields = time_part.trim().split(':');
    let hour: u8 = time_fields.next()?.parse().ok()?;
    let minute: u8 = time_fields.next()?.parse().ok()?;
    let second: u8 = time_fields.next()?.parse().ok()?;
    if time_fields.next().is_some() {
        return None;
    }

    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

fn parse_standard(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(instant);
    }
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc2822) {
        return Some(instant);
    }
    if let Ok(instant) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Some(instant);
    }

    let naive = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]/[month]/[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
        format_description!("[year]/[month]/[day] [hour]:[minute]"),
    ];
    for format in naive {
        if let Ok(datetime) = PrimitiveDateTime::parse(raw, format) {
            return Some(datetime.assume_offset(offset));
        }
    }

    // A bare ISO date is UTC midnight; a slashed one is local midnight.
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    Date::parse(raw, format_description!("[year]/[month]/[day]"))
        .ok()
        .map(|date| date.midnight().assume_offset(offset))
}

fn format_date(local: OffsetDateTime, locale: Locale) -> String {
    format!(
        "{:02} {} {}",
        local.day(),
        locale.month_abbrev(local.month()),
        local.year()
    )
}

fn format_time(local: OffsetDateTime, locale: Locale) -> String {
    let hour = local.hour();
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{:02}:{:02} {}", hour12, local.minute(), locale.meridiem(hour))
}
