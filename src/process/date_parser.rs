use chrono::{Days, NaiveDate};

/// Build a calendar date from the feed's `YYYY MM DD` integer fields.
pub fn date_from_fields(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year: i32 = year.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The `count` consecutive calendar days after `anchor`, anchor excluded.
pub fn following_days(anchor: NaiveDate, count: usize) -> Vec<NaiveDate> {
    (1..=count as u64)
        .filter_map(|i| anchor.checked_add_days(Days::new(i)))
        .collect()
}

/// `YYYY-MM-DD`
pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
