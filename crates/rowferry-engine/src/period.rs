//! Symbolic period filters resolved against the run timestamp.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use rowferry_types::config::{ConfigError, PeriodConfig};
use rowferry_types::descriptor::PeriodBound;

/// Resolve a period declaration into concrete begin/end bounds.
///
/// On the first-ever run an explicit `starting` value replaces the lower
/// bound so the initial load reaches back past the symbolic window.
pub fn resolve(
    config: &PeriodConfig,
    now: NaiveDateTime,
    first_ever: bool,
) -> Result<PeriodBound, ConfigError> {
    let (mut begin, end) = bounds(&config.value, now)?;
    if first_ever {
        if let Some(starting) = &config.starting {
            begin = NaiveDateTime::parse_from_str(starting, "%Y-%m-%d %H:%M:%S")
                .map_err(|_| ConfigError::BadTimestamp(starting.clone()))?;
        }
    }
    Ok(PeriodBound {
        column: config.column.clone(),
        table: config.table.clone(),
        begin,
        end,
    })
}

fn bounds(value: &str, now: NaiveDateTime) -> Result<(NaiveDateTime, NaiveDateTime), ConfigError> {
    let today = now.date();
    match value.to_lowercase().as_str() {
        "@today" => Ok(day_bounds(today)),
        "@yesterday" | "@lastday" => Ok(day_bounds(today - Duration::days(1))),
        "@lasthour" => {
            let hour_ago = now - Duration::hours(1);
            let begin = hour_ago
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .unwrap_or(hour_ago);
            let end = hour_ago
                .with_minute(59)
                .and_then(|t| t.with_second(59))
                .unwrap_or(hour_ago);
            Ok((begin, end))
        }
        "@thismonth" | "@month" => Ok(month_bounds(today.year(), today.month())),
        "@lastmonth" => {
            let (year, month) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            Ok(month_bounds(year, month))
        }
        _ => Err(ConfigError::UnknownPeriod(value.to_string())),
    }
}

fn day_bounds(day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        day.and_time(NaiveTime::MIN),
        day.and_hms_opt(23, 59, 59).unwrap_or(day.and_time(NaiveTime::MIN)),
    )
}

fn month_bounds(year: i32, month: u32) -> (NaiveDateTime, NaiveDateTime) {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(NaiveDate::MIN);
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap_or(NaiveDate::MAX);
    let last = next_first - Duration::days(1);
    (first.and_time(NaiveTime::MIN), day_bounds(last).1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(value: &str) -> PeriodConfig {
        PeriodConfig {
            column: "updated_at".into(),
            table: None,
            value: value.into(),
            starting: None,
            utc: false,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn today_spans_the_whole_day() {
        let b = resolve(&cfg("@Today"), at(2024, 3, 15, 10, 30), false).unwrap();
        assert_eq!(b.begin, at(2024, 3, 15, 0, 0));
        assert_eq!(b.end.to_string(), "2024-03-15 23:59:59");
    }

    #[test]
    fn yesterday() {
        let b = resolve(&cfg("@Yesterday"), at(2024, 3, 1, 10, 0), false).unwrap();
        assert_eq!(b.begin, at(2024, 2, 29, 0, 0));
        assert_eq!(b.end.to_string(), "2024-02-29 23:59:59");
    }

    #[test]
    fn last_hour_is_the_previous_clock_hour() {
        let b = resolve(&cfg("@LastHour"), at(2024, 3, 15, 0, 20), false).unwrap();
        assert_eq!(b.begin.to_string(), "2024-03-14 23:00:00");
        assert_eq!(b.end.to_string(), "2024-03-14 23:59:59");
    }

    #[test]
    fn last_month_handles_year_rollover() {
        let b = resolve(&cfg("@LastMonth"), at(2024, 1, 10, 0, 0), false).unwrap();
        assert_eq!(b.begin.to_string(), "2023-12-01 00:00:00");
        assert_eq!(b.end.to_string(), "2023-12-31 23:59:59");
    }

    #[test]
    fn starting_overrides_begin_only_on_first_run() {
        let mut c = cfg("@Today");
        c.starting = Some("2020-01-01 00:00:00".into());
        let first = resolve(&c, at(2024, 3, 15, 10, 0), true).unwrap();
        assert_eq!(first.begin.to_string(), "2020-01-01 00:00:00");
        let later = resolve(&c, at(2024, 3, 15, 10, 0), false).unwrap();
        assert_eq!(later.begin, at(2024, 3, 15, 0, 0));
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = resolve(&cfg("@Fortnight"), at(2024, 3, 15, 0, 0), false).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPeriod(_)));
    }
}
