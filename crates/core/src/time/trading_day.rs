use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

// Eastern time as a fixed offset. DST drift is absorbed by the conservative
// cutoff below; NYSE close is 16:00 ET and we only treat the day as complete
// from 17:00.
const ET_OFFSET_SECS: i32 = -5 * 3600;

const CLOSE_CUTOFF_HOUR_ET: u32 = 17;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 0;

/// Resolves the trading date for a run: an explicit `YYYY-MM-DD` argument
/// wins; otherwise the most recent completed US trading day relative to
/// `now_utc`, rolling back over weekends and configured holidays.
pub fn resolve_trading_date(
    trading_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = trading_date_arg {
        return Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }

    let et = chrono::FixedOffset::east_opt(ET_OFFSET_SECS).context("invalid ET offset")?;
    let now_et = now_utc.with_timezone(&et);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date -= Duration::days(1);
    }

    let holidays = configured_holidays();
    while is_weekend(date) || holidays.contains(&date) {
        date -= Duration::days(1);
    }

    Ok(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date market holidays only; extend the moveable ones via
    // US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        for (m, d) in [(1, 1), (6, 19), (7, 4), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(extra) = std::env::var("US_MARKET_HOLIDAYS") {
        for part in extra.split(',') {
            if let Ok(date) = NaiveDate::parse_from_str(part.trim(), "%Y-%m-%d") {
                out.insert(date);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_argument_wins() {
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        let d = resolve_trading_date(Some("2026-08-20"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 8, 20).unwrap());
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2026-08-20 is a Thursday. 20:00 UTC = 15:00 ET, before the cutoff.
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 20, 0, 0).unwrap();
        let d = resolve_trading_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 8, 19).unwrap());
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 23:00 UTC = 18:00 ET, past the cutoff.
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 23, 0, 0).unwrap();
        let d = resolve_trading_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 8, 20).unwrap());
    }

    #[test]
    fn rolls_back_over_the_weekend() {
        // 2026-08-23 is a Sunday; rolls back to Friday 2026-08-21.
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 23, 0, 0).unwrap();
        let d = resolve_trading_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 8, 21).unwrap());
    }

    #[test]
    fn rolls_back_over_a_fixed_holiday() {
        // Independence Day 2025 falls on a Friday; rolls back to Thursday.
        let now = Utc.with_ymd_and_hms(2025, 7, 4, 23, 0, 0).unwrap();
        let d = resolve_trading_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
    }
}
