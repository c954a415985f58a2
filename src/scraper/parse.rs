//! Pure parsing layer for the economic calendar scraper.
//! Handles URL construction, time/date parsing, source-TZ to UTC
//! conversion, and row extraction from the rendered DOM.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Impact, NewEvent};

/// Base URL for the calendar source
pub const BASE_URL: &str = "https://www.forexfactory.com/calendar";

/// Month abbreviations (lowercase) for URL construction
const MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Week URL for a given date, anchored on that date's day.
/// Format: ?week=nov25.2024
pub fn week_url(date: NaiveDate) -> String {
    let month = MONTH_ABBREVS[date.month0() as usize];
    format!("{}?week={}{}.{}", BASE_URL, month, date.day(), date.year())
}

/// Day URL for a given date. Format: ?day=nov25.2024
pub fn day_url(date: NaiveDate) -> String {
    let month = MONTH_ABBREVS[date.month0() as usize];
    format!("{}?day={}{}.{}", BASE_URL, month, date.day(), date.year())
}

/// Month URL. Format: ?month=nov.2024
pub fn month_url(year: i32, month: u32) -> String {
    let abbrev = MONTH_ABBREVS[(month - 1) as usize];
    format!("{}?month={}.{}", BASE_URL, abbrev, year)
}

/// A calendar time cell after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarTime {
    Clock(NaiveTime),
    AllDay,
    Tentative,
    Unknown,
}

lazy_static! {
    static ref CLOCK_RE: Regex =
        Regex::new(r"^(\d{1,2}):(\d{2})(am|pm)$").expect("valid clock regex");
    static ref YEAR_SUFFIX_RE: Regex = Regex::new(r",\s*(\d{4})$").expect("valid year regex");
}

/// Parse a calendar time string like "8:30am", "All Day", or "Tentative".
pub fn parse_calendar_time(time_str: &str) -> CalendarTime {
    let time_str = time_str.trim().to_lowercase();

    if time_str.is_empty() {
        return CalendarTime::Unknown;
    }
    if time_str == "tentative" {
        return CalendarTime::Tentative;
    }
    if time_str == "all day" {
        return CalendarTime::AllDay;
    }

    let caps = match CLOCK_RE.captures(&time_str) {
        Some(caps) => caps,
        None => return CalendarTime::Unknown,
    };

    let mut hour: u32 = caps[1].parse().unwrap_or(0);
    let minute: u32 = caps[2].parse().unwrap_or(0);
    let period = &caps[3];

    // Convert to 24-hour format: 12:00am = 00:00, 12:00pm stays 12:00
    if period == "am" {
        if hour == 12 {
            hour = 0;
        }
    } else if hour != 12 {
        hour += 12;
    }

    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(t) => CalendarTime::Clock(t),
        None => CalendarTime::Unknown,
    }
}

/// Parse a calendar date string like "Mon Nov 25", "Nov 25", or "Nov 25, 2025".
pub fn parse_calendar_date(date_str: &str, default_year: i32) -> PipelineResult<NaiveDate> {
    let normalized = date_str.split_whitespace().collect::<Vec<_>>().join(" ");

    let (rest, year) = match YEAR_SUFFIX_RE.captures(&normalized) {
        Some(caps) => {
            let year = caps[1]
                .parse()
                .map_err(|_| PipelineError::parse_error("invalid year in date"))?;
            (normalized[..caps.get(0).map(|m| m.start()).unwrap_or(0)].to_string(), year)
        }
        None => (normalized.clone(), default_year),
    };

    let mut parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() == 3 {
        // Leading weekday abbreviation
        parts.remove(0);
    }
    if parts.len() != 2 {
        return Err(PipelineError::parse_error(format!(
            "cannot parse date string: {}",
            date_str
        )));
    }

    let month_str = parts[0].to_lowercase();
    let month_key = month_str.get(..3).unwrap_or("");
    let month = MONTH_ABBREVS
        .iter()
        .position(|&m| m == month_key)
        .map(|i| i as u32 + 1)
        .ok_or_else(|| {
            PipelineError::parse_error(format!("unknown month abbreviation: {}", parts[0]))
        })?;

    let day: u32 = parts[1]
        .parse()
        .map_err(|_| PipelineError::parse_error(format!("invalid day value: {}", parts[1])))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| PipelineError::parse_error(format!("invalid date: {}", date_str)))
}

/// Convert a source-local (Eastern US) date and time to UTC.
/// Ambiguous fall-back hours resolve to the earlier (pre-shift) occurrence.
pub fn eastern_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    let local = match New_York.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Spring-forward gaps never occur in source data; shift forward one hour
        LocalResult::None => {
            let adjusted = naive + chrono::Duration::hours(1);
            match New_York.from_local_datetime(&adjusted) {
                LocalResult::Single(dt) => dt,
                LocalResult::Ambiguous(earliest, _) => earliest,
                LocalResult::None => New_York.from_utc_datetime(&naive),
            }
        }
    };
    local.with_timezone(&Utc)
}

/// Resolve a calendar time against its source date.
/// Returns the UTC timestamp plus a tentative marker, or None when the
/// time cell is unusable.
pub fn resolve_timestamp(date: NaiveDate, time: CalendarTime) -> Option<(DateTime<Utc>, bool)> {
    match time {
        CalendarTime::Clock(t) => Some((eastern_to_utc(date, t), false)),
        // All-day and tentative rows anchor at midnight UTC of the source date
        CalendarTime::AllDay => Some((midnight_utc(date), false)),
        CalendarTime::Tentative => Some((midnight_utc(date), true)),
        CalendarTime::Unknown => None,
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Map an impact marker class attribute to the canonical impact set.
/// Unknown markers default to low.
pub fn impact_from_marker(class_attr: &str) -> Impact {
    let class_attr = class_attr.to_lowercase();
    if class_attr.contains("red") {
        Impact::High
    } else if class_attr.contains("ora") {
        Impact::Medium
    } else if class_attr.contains("yel") {
        Impact::Low
    } else if class_attr.contains("gra") || class_attr.contains("holiday") {
        Impact::Holiday
    } else {
        Impact::Low
    }
}

/// Heuristics for detecting anti-bot interstitial pages
pub fn looks_like_challenge(html: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "Just a moment",
        "Checking your browser",
        "cf-browser-verification",
        "challenge-platform",
    ];
    MARKERS.iter().any(|m| html.contains(m))
}

/// One row of the rendered calendar table, cell texts as the source supplies them
#[derive(Debug, Clone, Default)]
pub struct RawCalendarRow {
    pub date_text: String,
    pub time_text: String,
    pub currency: String,
    pub impact_class: String,
    pub event_name: String,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
    pub is_day_breaker: bool,
}

/// Extract raw rows from the rendered calendar page.
pub fn extract_rows(html: &str) -> Vec<RawCalendarRow> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("tr.calendar__row").expect("valid row selector");
    let date_sel = Selector::parse(".calendar__date").expect("valid date selector");
    let time_sel = Selector::parse(".calendar__time").expect("valid time selector");
    let currency_sel = Selector::parse(".calendar__currency").expect("valid currency selector");
    let impact_sel = Selector::parse(".calendar__impact span").expect("valid impact selector");
    let event_sel = Selector::parse(".calendar__event").expect("valid event selector");
    let actual_sel = Selector::parse(".calendar__actual").expect("valid actual selector");
    let forecast_sel = Selector::parse(".calendar__forecast").expect("valid forecast selector");
    let previous_sel = Selector::parse(".calendar__previous").expect("valid previous selector");

    let mut rows = Vec::new();
    for row in doc.select(&row_sel) {
        let classes = row.value().attr("class").unwrap_or_default();
        let cell_text = |sel: &Selector| {
            row.select(sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };

        rows.push(RawCalendarRow {
            date_text: cell_text(&date_sel),
            time_text: cell_text(&time_sel),
            currency: cell_text(&currency_sel),
            impact_class: row
                .select(&impact_sel)
                .next()
                .and_then(|el| el.value().attr("class"))
                .unwrap_or_default()
                .to_string(),
            event_name: cell_text(&event_sel),
            actual: cell_text(&actual_sel),
            forecast: cell_text(&forecast_sel),
            previous: cell_text(&previous_sel),
            is_day_breaker: classes.contains("day-breaker"),
        });
    }
    rows
}

/// Walk raw rows into events, carrying the last seen date and time
/// forward across rows that omit them. Unparseable rows are skipped.
pub fn rows_to_events(rows: &[RawCalendarRow], default_year: i32) -> Vec<NewEvent> {
    let mut events = Vec::new();
    let mut current_date: Option<NaiveDate> = None;
    let mut current_time = CalendarTime::Unknown;

    for row in rows {
        if !row.date_text.is_empty() {
            match parse_calendar_date(&row.date_text, default_year) {
                Ok(date) => {
                    current_date = Some(date);
                    // A new day resets the carried time
                    current_time = CalendarTime::Unknown;
                }
                Err(e) => {
                    warn!("Skipping unparseable date cell '{}': {}", row.date_text, e);
                }
            }
        }
        if row.is_day_breaker {
            continue;
        }

        if !row.time_text.is_empty() {
            current_time = parse_calendar_time(&row.time_text);
        }

        let date = match current_date {
            Some(d) => d,
            None => {
                warn!("Skipping row with no date context: {}", row.event_name);
                continue;
            }
        };

        if row.event_name.is_empty() || row.currency.is_empty() {
            continue;
        }

        let (timestamp, tentative) = match resolve_timestamp(date, current_time) {
            Some(resolved) => resolved,
            None => {
                warn!(
                    "Skipping row with unusable time '{}': {}",
                    row.time_text, row.event_name
                );
                continue;
            }
        };

        events.push(NewEvent {
            timestamp,
            currency: row.currency.clone(),
            event_name: row.event_name.clone(),
            impact: impact_from_marker(&row.impact_class),
            actual: normalize_value(&row.actual),
            forecast: normalize_value(&row.forecast),
            previous: normalize_value(&row.previous),
            tentative,
        });
    }

    events.sort_by_key(|e| e.timestamp);
    events
}

/// Empty source cells normalize to None
fn normalize_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_week_url_format() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 25).unwrap();
        assert_eq!(
            week_url(date),
            "https://www.forexfactory.com/calendar?week=nov25.2024"
        );
    }

    #[test]
    fn test_day_and_month_urls() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        assert_eq!(
            day_url(date),
            "https://www.forexfactory.com/calendar?day=jun7.2024"
        );
        assert_eq!(
            month_url(2024, 11),
            "https://www.forexfactory.com/calendar?month=nov.2024"
        );
    }

    #[test]
    fn test_parse_calendar_time_clock() {
        assert_eq!(
            parse_calendar_time("8:30am"),
            CalendarTime::Clock(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_calendar_time("2:00pm"),
            CalendarTime::Clock(NaiveTime::from_hms_opt(14, 0, 0).unwrap())
        );
        assert_eq!(
            parse_calendar_time("12:00am"),
            CalendarTime::Clock(NaiveTime::from_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_calendar_time("12:00pm"),
            CalendarTime::Clock(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_calendar_time_sentinels() {
        assert_eq!(parse_calendar_time("All Day"), CalendarTime::AllDay);
        assert_eq!(parse_calendar_time("Tentative"), CalendarTime::Tentative);
        assert_eq!(parse_calendar_time(""), CalendarTime::Unknown);
        assert_eq!(parse_calendar_time("whenever"), CalendarTime::Unknown);
    }

    #[test]
    fn test_parse_calendar_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 25).unwrap();
        assert_eq!(parse_calendar_date("Mon Nov 25", 2024).unwrap(), expected);
        assert_eq!(parse_calendar_date("Nov 25", 2024).unwrap(), expected);
        assert_eq!(parse_calendar_date("Nov 25, 2024", 2023).unwrap(), expected);
        assert!(parse_calendar_date("gibberish", 2024).is_err());
        assert!(parse_calendar_date("Xyz 25", 2024).is_err());
    }

    #[test]
    fn test_eastern_to_utc_handles_dst() {
        // July: EDT is UTC-4
        let summer = eastern_to_utc(
            NaiveDate::from_ymd_opt(2024, 7, 5).unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );
        assert_eq!(summer.hour(), 12);
        assert_eq!(summer.minute(), 30);

        // January: EST is UTC-5
        let winter = eastern_to_utc(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );
        assert_eq!(winter.hour(), 13);
    }

    #[test]
    fn test_ambiguous_fall_back_hour_resolves_to_first_occurrence() {
        // 2024-11-03 01:30 ET happens twice; the first occurrence is still EDT (UTC-4)
        let ts = eastern_to_utc(
            NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
        );
        assert_eq!(ts.hour(), 5);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn test_all_day_resolves_to_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let (ts, tentative) = resolve_timestamp(date, CalendarTime::AllDay).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-06-07T00:00:00+00:00");
        assert!(!tentative);
    }

    #[test]
    fn test_tentative_keeps_marker() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let (ts, tentative) = resolve_timestamp(date, CalendarTime::Tentative).unwrap();
        assert_eq!(ts.hour(), 0);
        assert!(tentative);
    }

    #[test]
    fn test_impact_from_marker() {
        assert_eq!(impact_from_marker("icon icon--ff-impact-red"), Impact::High);
        assert_eq!(
            impact_from_marker("icon icon--ff-impact-ora"),
            Impact::Medium
        );
        assert_eq!(impact_from_marker("icon icon--ff-impact-yel"), Impact::Low);
        assert_eq!(
            impact_from_marker("icon icon--ff-impact-gra"),
            Impact::Holiday
        );
        // Unknown markers default to low
        assert_eq!(impact_from_marker("icon icon--ff-impact-new"), Impact::Low);
        assert_eq!(impact_from_marker(""), Impact::Low);
    }

    #[test]
    fn test_challenge_detection() {
        assert!(looks_like_challenge(
            "<html><title>Just a moment...</title></html>"
        ));
        assert!(!looks_like_challenge("<html><body>calendar</body></html>"));
    }

    const SAMPLE_WEEK: &str = r#"
    <table class="calendar__table">
      <tr class="calendar__row calendar__row--day-breaker">
        <td class="calendar__date">Fri Jun 7</td>
      </tr>
      <tr class="calendar__row">
        <td class="calendar__date"></td>
        <td class="calendar__time">8:30am</td>
        <td class="calendar__currency">USD</td>
        <td class="calendar__impact"><span class="icon icon--ff-impact-red" title="High Impact Expected"></span></td>
        <td class="calendar__event">Non-Farm Payrolls</td>
        <td class="calendar__actual">272K</td>
        <td class="calendar__forecast">180K</td>
        <td class="calendar__previous">165K</td>
      </tr>
      <tr class="calendar__row">
        <td class="calendar__date"></td>
        <td class="calendar__time"></td>
        <td class="calendar__currency">USD</td>
        <td class="calendar__impact"><span class="icon icon--ff-impact-red"></span></td>
        <td class="calendar__event">Unemployment Rate</td>
        <td class="calendar__actual">4.0%</td>
        <td class="calendar__forecast">3.9%</td>
        <td class="calendar__previous">3.9%</td>
      </tr>
      <tr class="calendar__row">
        <td class="calendar__date"></td>
        <td class="calendar__time">All Day</td>
        <td class="calendar__currency">EUR</td>
        <td class="calendar__impact"><span class="icon icon--ff-impact-gra"></span></td>
        <td class="calendar__event">French Bank Holiday</td>
        <td class="calendar__actual"></td>
        <td class="calendar__forecast"></td>
        <td class="calendar__previous"></td>
      </tr>
    </table>
    "#;

    #[test]
    fn test_rows_to_events_carries_date_and_time_forward() {
        let rows = extract_rows(SAMPLE_WEEK);
        let events = rows_to_events(&rows, 2024);

        assert_eq!(events.len(), 3);

        // Holiday at midnight UTC sorts first
        assert_eq!(events[0].event_name, "French Bank Holiday");
        assert_eq!(events[0].impact, Impact::Holiday);
        assert_eq!(events[0].actual, None);

        let nfp = &events[1];
        assert_eq!(nfp.event_name, "Non-Farm Payrolls");
        assert_eq!(nfp.currency, "USD");
        assert_eq!(nfp.impact, Impact::High);
        assert_eq!(nfp.actual.as_deref(), Some("272K"));
        // 8:30am EDT on Jun 7 is 12:30 UTC
        assert_eq!(nfp.timestamp.to_rfc3339(), "2024-06-07T12:30:00+00:00");

        // Second row omitted the time cell and inherits 8:30am
        let unemployment = &events[2];
        assert_eq!(unemployment.event_name, "Unemployment Rate");
        assert_eq!(unemployment.timestamp, nfp.timestamp);
    }

    #[test]
    fn test_rows_without_date_context_are_skipped() {
        let html = r#"
        <table>
          <tr class="calendar__row">
            <td class="calendar__time">8:30am</td>
            <td class="calendar__currency">USD</td>
            <td class="calendar__event">Orphan Event</td>
          </tr>
        </table>
        "#;
        let rows = extract_rows(html);
        assert_eq!(rows_to_events(&rows, 2024).len(), 0);
    }
}
