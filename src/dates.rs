//! Flexible parsing of human-written dates for the `--after-date` filter.
//!
//! Accepts absolute dates in the common formats people actually type
//! (`2021-01-01`, `01/15/2021`, `Jan 15 2021`, ...) as well as relative
//! phrases such as `2 weeks ago`, `yesterday`, and `today`. All parsing
//! resolves to a calendar date; times of day are ignored.

use std::sync::LazyLock;

use chrono::{Days, Local, Months, NaiveDate};
use regex::Regex;

/// Absolute formats tried in order. First match wins.
const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
];

/// Matches relative phrases like `3 days ago` or `1 month ago`.
static RELATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)^(\d{1,4})\s+(day|week|month|year)s?\s+ago$")
        .expect("relative date pattern is valid")
});

/// Parses a human-written date string into a calendar date.
///
/// Returns `None` when the input matches no supported absolute format and
/// no supported relative phrase, or when a relative phrase underflows the
/// calendar.
#[must_use]
pub fn parse_flexible_date(input: &str) -> Option<NaiveDate> {
    parse_flexible_date_from(input, Local::now().date_naive())
}

/// Like [`parse_flexible_date`] but with an explicit "today" anchor for
/// relative phrases, so callers and tests stay deterministic.
#[must_use]
pub fn parse_flexible_date_from(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "today" | "now" => return Some(today),
        "yesterday" => return today.checked_sub_days(Days::new(1)),
        _ => {}
    }

    let captures = RELATIVE_PATTERN.captures(trimmed)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();
    match unit.as_str() {
        "day" => today.checked_sub_days(Days::new(amount)),
        "week" => today.checked_sub_days(Days::new(amount.checked_mul(7)?)),
        "month" => today.checked_sub_months(Months::new(u32::try_from(amount).ok()?)),
        "year" => {
            let months = u32::try_from(amount).ok()?.checked_mul(12)?;
            today.checked_sub_months(Months::new(months))
        }
        _ => None,
    }
}
