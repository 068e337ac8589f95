use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone};

/// This is the standard way of converting a date to a month key in blackhole-debt. Keys are
/// zero-padded, so sorting them as strings sorts them chronologically.
pub fn month_key<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parses a user supplied month such as `2025-3` or `2025-03` into its canonical key.
pub fn parse_month_key(value: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|_| anyhow!("{value} is not a month, expected YYYY-MM"))?;
    Ok(format!("{:04}-{:02}", date.year(), date.month()))
}

/// Formats a minute count the way the report shows it: `2h 5m` or `5m`.
pub fn format_minutes(total_minutes: f64) -> String {
    let total_minutes = total_minutes.max(0.);
    let hours = (total_minutes / 60.).floor() as u64;
    let minutes = (total_minutes % 60.).floor() as u64;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone, Utc};

    use super::{format_minutes, month_key, parse_month_key};

    #[test]
    fn test_month_key_is_zero_padded() {
        let date = Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap();
        assert_eq!(month_key(&date), "2025-03");

        let date = Local.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(month_key(&date), "2024-12");
    }

    #[test]
    fn test_month_keys_sort_chronologically() {
        let mut keys = vec!["2025-01", "2024-11", "2025-03", "2024-02"];
        keys.sort_by(|a, b| b.cmp(a));
        assert_eq!(keys, vec!["2025-03", "2025-01", "2024-11", "2024-02"]);
        assert!("2025-03" > "2025-01");
    }

    #[test]
    fn test_minutes_formatting() {
        assert_eq!(format_minutes(0.4), "0m");
        assert_eq!(format_minutes(59.9), "59m");
        assert_eq!(format_minutes(125.), "2h 5m");
    }

    #[test]
    fn test_month_arguments_are_normalized() {
        assert_eq!(parse_month_key("2025-03").unwrap(), "2025-03");
        assert_eq!(parse_month_key(" 2025-3 ").unwrap(), "2025-03");
        assert!(parse_month_key("2025-13").is_err());
        assert!(parse_month_key("march").is_err());
        assert!(parse_month_key("2025-03-01").is_err());
    }
}
