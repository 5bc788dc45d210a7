//! NYSE full-day closures, computed from exchange rules rather than a
//! date table so any year in range works.

use chrono::{Datelike, NaiveDate, Weekday};

/// Full-day NYSE holiday check (weekends handled by the caller).
pub fn nyse_holiday(date: NaiveDate) -> bool {
    let year = date.year();

    // New Year's Day. Observed Monday when Jan 1 is a Sunday; when it is
    // a Saturday the exchange does not observe it at all.
    if let Some(observed) = observed_fixed(year, 1, 1) {
        if date == observed {
            return true;
        }
    }

    // Martin Luther King Jr. Day — third Monday of January (since 1998).
    if date == nth_weekday(year, 1, Weekday::Mon, 3) {
        return true;
    }

    // Washington's Birthday — third Monday of February.
    if date == nth_weekday(year, 2, Weekday::Mon, 3) {
        return true;
    }

    // Good Friday.
    if date == easter_sunday(year) - chrono::Duration::days(2) {
        return true;
    }

    // Memorial Day — last Monday of May.
    if date == last_weekday(year, 5, Weekday::Mon) {
        return true;
    }

    // Juneteenth — observed since 2022.
    if year >= 2022 {
        if let Some(observed) = observed_fixed(year, 6, 19) {
            if date == observed {
                return true;
            }
        }
        // Saturday Juneteenth is observed the Friday before.
        let juneteenth = NaiveDate::from_ymd_opt(year, 6, 19).unwrap();
        if juneteenth.weekday() == Weekday::Sat
            && date == juneteenth - chrono::Duration::days(1)
        {
            return true;
        }
    }

    // Independence Day — Friday before when on Saturday, Monday after
    // when on Sunday.
    if date == shifted_fixed(year, 7, 4) {
        return true;
    }

    // Labor Day — first Monday of September.
    if date == nth_weekday(year, 9, Weekday::Mon, 1) {
        return true;
    }

    // Thanksgiving — fourth Thursday of November.
    if date == nth_weekday(year, 11, Weekday::Thu, 4) {
        return true;
    }

    // Christmas — shifted like Independence Day.
    if date == shifted_fixed(year, 12, 25) {
        return true;
    }

    false
}

/// Fixed-date holiday observed Monday when it falls on Sunday, skipped
/// when it falls on Saturday (NYSE New Year / Juneteenth-Sunday rule).
fn observed_fixed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    match date.weekday() {
        Weekday::Sat => None,
        Weekday::Sun => Some(date + chrono::Duration::days(1)),
        _ => Some(date),
    }
}

/// Fixed-date holiday shifted to the nearest weekday (Friday before a
/// Saturday, Monday after a Sunday).
fn shifted_fixed(year: i32, month: u32, day: u32) -> NaiveDate {
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
    match date.weekday() {
        Weekday::Sat => date - chrono::Duration::days(1),
        Weekday::Sun => date + chrono::Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + chrono::Duration::days((offset + (n - 1) * 7) as i64)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let first_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    let last = first_next - chrono::Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - chrono::Duration::days(offset as i64)
}

/// Easter Sunday via the anonymous Gregorian computus.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn easter_known_dates() {
        assert_eq!(easter_sunday(2024), d(2024, 3, 31));
        assert_eq!(easter_sunday(2025), d(2025, 4, 20));
        assert_eq!(easter_sunday(2026), d(2026, 4, 5));
    }

    #[test]
    fn good_friday_closes() {
        assert!(nyse_holiday(d(2024, 3, 29)));
        assert!(nyse_holiday(d(2026, 4, 3)));
    }

    #[test]
    fn thanksgiving_and_mlk() {
        assert!(nyse_holiday(d(2024, 11, 28)));
        assert!(nyse_holiday(d(2025, 1, 20)));
    }

    #[test]
    fn shifted_christmas() {
        // 2021-12-25 was a Saturday; observed Friday the 24th.
        assert!(nyse_holiday(d(2021, 12, 24)));
        assert!(!nyse_holiday(d(2021, 12, 27)));
        // 2022-06-19 (Juneteenth) was a Sunday; observed Monday the 20th.
        assert!(nyse_holiday(d(2022, 6, 20)));
    }

    #[test]
    fn ordinary_weekday_is_open() {
        assert!(!nyse_holiday(d(2026, 3, 11)));
    }
}
