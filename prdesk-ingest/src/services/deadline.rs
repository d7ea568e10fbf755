//! Deadline and broadcast time resolution
//!
//! Converts the date/time/zone fragments found in media-query emails into
//! absolute UTC instants.
//!
//! **Zone names:**
//! - Standard/daylight names and their abbreviations ("Eastern Standard
//!   Time", "EDT") carry a fixed offset: the sender stated which one applies.
//! - Generic names ("Eastern Time", "ET", "Pacific") and IANA names resolve
//!   through the tz database for the date in question.
//!
//! **Roll-forward:** relative fragments (a bare time of day, a weekday, a
//! month + day without year) resolve to the next occurrence strictly after
//! the context clock.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Time assumed when only a date is known (close of business)
pub const DEFAULT_DEADLINE_HOUR: u32 = 17;

/// Resolved timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    /// Explicit standard/daylight offset
    Fixed(FixedOffset),
    /// DST-aware zone
    Iana(Tz),
}

impl Zone {
    /// Local wall-clock time to UTC
    ///
    /// Ambiguous local times (DST fall-back) take the earlier instant;
    /// nonexistent ones (spring-forward gap) shift one hour later.
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Zone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
            Zone::Iana(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Zone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
            Zone::Iana(tz) => instant.with_timezone(tz).date_naive(),
        }
    }
}

static STATED_ZONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:eastern|central|mountain|pacific|alaska|hawaii(?:-aleutian)?)(?:\s+(?:standard|daylight))?\s+time\b")
        .expect("Invalid stated zone regex")
});

// Abbreviations are matched upper-case only: "pt" and "et" are ordinary words
static ZONE_ABBREVIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:AKST|AKDT|EST|EDT|CST|CDT|MST|MDT|PST|PDT|HST|UTC|GMT|ET|CT|MT|PT)\b")
        .expect("Invalid zone abbreviation regex")
});

static TIME_12H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?\s?m\b\.?")
        .expect("Invalid 12h time regex")
});

static TIME_24H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("Invalid 24h time regex")
});

static TIME_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(noon|midday|midnight|end of (?:the )?day|eod|close of business|cob)\b")
        .expect("Invalid time words regex")
});

static DATE_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("Invalid ISO date regex")
});

static DATE_US: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").expect("Invalid US date regex")
});

static DATE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4}))?",
    )
    .expect("Invalid month-name date regex")
});

/// Look up a zone by name, abbreviation, or IANA identifier
pub fn lookup_zone(name: &str) -> Option<Zone> {
    let lowered = name.trim().to_lowercase().replace('.', "");
    // "Eastern Time (US & Canada)" -> "eastern time"
    let base = lowered.split('(').next().unwrap_or("");
    let key = base.split_whitespace().collect::<Vec<_>>().join(" ");

    let hours_west = match key.as_str() {
        "eastern standard time" | "est" => Some(5),
        "eastern daylight time" | "edt" => Some(4),
        "central standard time" | "cst" => Some(6),
        "central daylight time" | "cdt" => Some(5),
        "mountain standard time" | "mst" => Some(7),
        "mountain daylight time" | "mdt" => Some(6),
        "pacific standard time" | "pst" => Some(8),
        "pacific daylight time" | "pdt" => Some(7),
        "alaska standard time" | "akst" => Some(9),
        "alaska daylight time" | "akdt" => Some(8),
        "hawaii standard time" | "hawaii-aleutian standard time" | "hst" => Some(10),
        "utc" | "gmt" | "z" => Some(0),
        _ => None,
    };
    if let Some(hours) = hours_west {
        return FixedOffset::west_opt(hours * 3600).map(Zone::Fixed);
    }

    let generic = match key.as_str() {
        "eastern" | "eastern time" | "et" => Some(chrono_tz::America::New_York),
        "central" | "central time" | "ct" => Some(chrono_tz::America::Chicago),
        "mountain" | "mountain time" | "mt" => Some(chrono_tz::America::Denver),
        "pacific" | "pacific time" | "pt" => Some(chrono_tz::America::Los_Angeles),
        "alaska" | "alaska time" => Some(chrono_tz::America::Anchorage),
        "hawaii" | "hawaii time" | "hawaii-aleutian time" => Some(chrono_tz::Pacific::Honolulu),
        _ => None,
    };
    if let Some(tz) = generic {
        return Some(Zone::Iana(tz));
    }

    name.trim().parse::<Tz>().ok().map(Zone::Iana)
}

/// First zone mentioned anywhere in `text`, with the matched wording
pub fn find_zone(text: &str) -> Option<(String, Zone)> {
    let stated = STATED_ZONE.find(text);
    let abbreviation = ZONE_ABBREVIATION.find(text);

    let first = match (stated, abbreviation) {
        (Some(a), Some(b)) => Some(if a.start() <= b.start() { a } else { b }),
        (a, b) => a.or(b),
    }?;

    lookup_zone(first.as_str()).map(|zone| (first.as_str().to_string(), zone))
}

/// First time of day in `text`
///
/// Accepts "3pm", "3:30 p.m.", "15:30", "noon" and end-of-day phrases
/// (resolved to close of business).
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = TIME_12H.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if (1..=12).contains(&hour) {
            let is_pm = caps[3].eq_ignore_ascii_case("p");
            let hour24 = match (hour, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            };
            return NaiveTime::from_hms_opt(hour24, minute, 0);
        }
    }

    if let Some(caps) = TIME_24H.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let words = TIME_WORDS.captures(text)?;
    match words[1].to_lowercase().as_str() {
        "noon" | "midday" => NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => NaiveTime::from_hms_opt(23, 59, 0),
        _ => NaiveTime::from_hms_opt(DEFAULT_DEADLINE_HOUR, 0, 0),
    }
}

/// First calendar date in `text`
///
/// `fallback_year` fills in dates written without a year.
pub fn parse_date(text: &str, fallback_year: i32) -> Option<NaiveDate> {
    if let Some(caps) = DATE_ISO.captures(text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = DATE_MONTH_NAME.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => fallback_year,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_US.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => expand_year(y.as_str().parse().ok()?),
            None => fallback_year,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

fn expand_year(year: i32) -> i32 {
    if year < 100 {
        2000 + year
    } else {
        year
    }
}

/// Month number from an English name or abbreviation
pub fn month_number(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    let prefix = lowered.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Weekday from an English name or abbreviation
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let lowered = name.to_lowercase();
    let prefix = lowered.get(..3)?;
    match prefix {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Absolute instant for a local date + time in a zone
///
/// A missing time means close of business.
pub fn resolve(date: NaiveDate, time: Option<NaiveTime>, zone: &Zone) -> Option<DateTime<Utc>> {
    let time = match time {
        Some(t) => t,
        None => NaiveTime::from_hms_opt(DEFAULT_DEADLINE_HOUR, 0, 0)?,
    };
    zone.to_utc(date.and_time(time))
}

/// Next occurrence of a time of day after `now` (today, else tomorrow)
pub fn next_time_of_day(
    now: DateTime<Utc>,
    time: NaiveTime,
    zone: &Zone,
) -> Option<DateTime<Utc>> {
    let today = zone.local_date(now);
    let candidate = resolve(today, Some(time), zone)?;
    if candidate > now {
        Some(candidate)
    } else {
        resolve(today + Duration::days(1), Some(time), zone)
    }
}

/// Next occurrence of a weekday after `now`
///
/// Today counts only if the time has not passed yet.
pub fn next_weekday(
    now: DateTime<Utc>,
    weekday: Weekday,
    time: Option<NaiveTime>,
    zone: &Zone,
) -> Option<DateTime<Utc>> {
    let today = zone.local_date(now);
    let days_ahead = (7 + weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    let date = today + Duration::days(days_ahead);
    let candidate = resolve(date, time, zone)?;
    if candidate > now {
        Some(candidate)
    } else {
        resolve(date + Duration::days(7), time, zone)
    }
}

/// Next occurrence of a month + day after `now` (this year, else next year)
pub fn next_month_day(
    now: DateTime<Utc>,
    month: u32,
    day: u32,
    time: Option<NaiveTime>,
    zone: &Zone,
) -> Option<DateTime<Utc>> {
    let year = zone.local_date(now).year();
    let this_year = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| resolve(date, time, zone));

    match this_year {
        Some(candidate) if candidate > now => Some(candidate),
        _ => NaiveDate::from_ymd_opt(year + 1, month, day).and_then(|date| resolve(date, time, zone)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_eastern_standard_time_noon() {
        let date = parse_date("Wednesday, December 17, 2025", 2000).unwrap();
        let time = parse_time("12:00 pm").unwrap();
        let zone = lookup_zone("Eastern Standard Time").unwrap();

        let deadline = resolve(date, Some(time), &zone).unwrap();
        assert_eq!(deadline, utc("2025-12-17T17:00:00Z"));
    }

    #[test]
    fn test_daylight_name_keeps_stated_offset() {
        // Sender said EDT in December; the stated offset wins
        let date = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();
        let zone = lookup_zone("EDT").unwrap();
        let deadline = resolve(date, NaiveTime::from_hms_opt(12, 0, 0), &zone).unwrap();
        assert_eq!(deadline, utc("2025-12-17T16:00:00Z"));
    }

    #[test]
    fn test_generic_name_follows_dst() {
        let zone = lookup_zone("Pacific Time").unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0);

        let summer = resolve(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), noon, &zone).unwrap();
        let winter = resolve(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(), noon, &zone).unwrap();
        assert_eq!(summer, utc("2025-07-01T19:00:00Z"));
        assert_eq!(winter, utc("2025-01-15T20:00:00Z"));
    }

    #[test]
    fn test_lookup_variants() {
        assert!(lookup_zone("Eastern Time (US & Canada)").is_some());
        assert!(lookup_zone("e.s.t.").is_some());
        assert!(lookup_zone("America/Chicago").is_some());
        assert!(lookup_zone("Mars Standard Time").is_none());
    }

    #[test]
    fn test_find_zone_ignores_lowercase_words() {
        assert!(find_zone("the pt cruiser et al").is_none());

        let (matched, _) = find_zone("Airs at 7 p.m. ET on Monday").unwrap();
        assert_eq!(matched, "ET");

        let (matched, zone) = find_zone("by 3pm Central Standard Time").unwrap();
        assert_eq!(matched, "Central Standard Time");
        assert_eq!(zone, Zone::Fixed(FixedOffset::west_opt(6 * 3600).unwrap()));
    }

    #[test]
    fn test_parse_time_forms() {
        assert_eq!(parse_time("3pm"), NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(parse_time("by 3:30 p.m. ET"), NaiveTime::from_hms_opt(15, 30, 0));
        assert_eq!(parse_time("12 am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_time("16:45"), NaiveTime::from_hms_opt(16, 45, 0));
        assert_eq!(parse_time("by noon"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_time("end of day"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_time("no time here"), None);
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("2025-12-17", 2000), NaiveDate::from_ymd_opt(2025, 12, 17));
        assert_eq!(parse_date("12/17/25", 2000), NaiveDate::from_ymd_opt(2025, 12, 17));
        assert_eq!(parse_date("Dec. 17th", 2026), NaiveDate::from_ymd_opt(2026, 12, 17));
        assert_eq!(parse_date("February 30, 2025", 2025), None);
    }

    #[test]
    fn test_next_time_of_day_rolls_to_tomorrow() {
        let zone = lookup_zone("EST").unwrap();
        let now = utc("2025-12-15T21:00:00Z"); // 4pm EST
        let three_pm = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        let five_pm = NaiveTime::from_hms_opt(17, 0, 0).unwrap();

        assert_eq!(next_time_of_day(now, three_pm, &zone), Some(utc("2025-12-16T20:00:00Z")));
        assert_eq!(next_time_of_day(now, five_pm, &zone), Some(utc("2025-12-15T22:00:00Z")));
    }

    #[test]
    fn test_next_weekday() {
        let zone = lookup_zone("EST").unwrap();
        // Monday 2025-12-15, 10am EST
        let now = utc("2025-12-15T15:00:00Z");
        let noon = NaiveTime::from_hms_opt(12, 0, 0);

        let friday = next_weekday(now, Weekday::Fri, noon, &zone).unwrap();
        assert_eq!(friday, utc("2025-12-19T17:00:00Z"));

        // Monday noon is still ahead today
        let monday = next_weekday(now, Weekday::Mon, noon, &zone).unwrap();
        assert_eq!(monday, utc("2025-12-15T17:00:00Z"));

        // Monday 9am already passed: next week
        let early = next_weekday(now, Weekday::Mon, NaiveTime::from_hms_opt(9, 0, 0), &zone).unwrap();
        assert_eq!(early, utc("2025-12-22T14:00:00Z"));
    }

    #[test]
    fn test_next_month_day_rolls_to_next_year() {
        let zone = lookup_zone("EST").unwrap();
        let now = utc("2025-12-15T15:00:00Z");

        let january = next_month_day(now, 1, 5, None, &zone).unwrap();
        assert_eq!(january, utc("2026-01-05T22:00:00Z"));

        let later = next_month_day(now, 12, 20, None, &zone).unwrap();
        assert_eq!(later, utc("2025-12-20T22:00:00Z"));
    }
}
