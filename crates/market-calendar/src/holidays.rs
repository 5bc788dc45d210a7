//! Weekday market closures for Shanghai/Shenzhen and HKEX, 2020-2030.
//!
//! Mainland and Hong Kong closures follow the lunar calendar and annual
//! government gazettes, so they are embedded as explicit tables rather
//! than computed. Weekends are excluded by the caller; only weekday
//! closures appear here. Dates past the table range fall back to the
//! weekend rule (fail open).

use chrono::{Datelike, NaiveDate};

pub fn cn_holiday(date: NaiveDate) -> bool {
    in_table(CN_CLOSURES, date)
}

pub fn hk_holiday(date: NaiveDate) -> bool {
    in_table(HK_CLOSURES, date)
}

fn in_table(table: &[(i32, &[&str])], date: NaiveDate) -> bool {
    let Some((_, days)) = table.iter().find(|(y, _)| *y == date.year()) else {
        return false;
    };
    let key = format!("{:02}-{:02}", date.month(), date.day());
    days.contains(&key.as_str())
}

/// Shanghai / Shenzhen exchange weekday closures.
const CN_CLOSURES: &[(i32, &[&str])] = &[
    (2020, &[
        "01-01", "01-24", "01-27", "01-28", "01-29", "01-30", "01-31",
        "04-06", "05-01", "05-04", "05-05", "06-25", "06-26",
        "10-01", "10-02", "10-05", "10-06", "10-07", "10-08",
    ]),
    (2021, &[
        "01-01", "02-11", "02-12", "02-15", "02-16", "02-17",
        "04-05", "05-03", "05-04", "05-05", "06-14", "09-20", "09-21",
        "10-01", "10-04", "10-05", "10-06", "10-07",
    ]),
    (2022, &[
        "01-03", "01-31", "02-01", "02-02", "02-03", "02-04",
        "04-04", "04-05", "05-02", "05-03", "05-04", "06-03", "09-12",
        "10-03", "10-04", "10-05", "10-06", "10-07",
    ]),
    (2023, &[
        "01-02", "01-23", "01-24", "01-25", "01-26", "01-27",
        "04-05", "05-01", "05-02", "05-03", "06-22", "06-23",
        "09-29", "10-02", "10-03", "10-04", "10-05", "10-06",
    ]),
    (2024, &[
        "01-01", "02-09", "02-12", "02-13", "02-14", "02-15", "02-16",
        "04-04", "04-05", "05-01", "05-02", "05-03", "06-10", "09-16", "09-17",
        "10-01", "10-02", "10-03", "10-04", "10-07",
    ]),
    (2025, &[
        "01-01", "01-28", "01-29", "01-30", "01-31", "02-03", "02-04",
        "04-04", "05-01", "05-02", "05-05", "06-02",
        "10-01", "10-02", "10-03", "10-06", "10-07", "10-08",
    ]),
    (2026, &[
        "01-01", "01-02", "02-16", "02-17", "02-18", "02-19", "02-20",
        "04-06", "05-01", "05-04", "05-05", "06-19", "09-25",
        "10-01", "10-02", "10-05", "10-06", "10-07",
    ]),
    (2027, &[
        "01-01", "02-05", "02-08", "02-09", "02-10", "02-11",
        "04-05", "05-03", "05-04", "05-05", "06-09", "09-15",
        "10-01", "10-04", "10-05", "10-06", "10-07",
    ]),
    (2028, &[
        "01-03", "01-26", "01-27", "01-28", "01-31", "02-01",
        "04-04", "05-01", "05-02", "05-03", "05-29", "10-03",
        "10-02", "10-04", "10-05", "10-06",
    ]),
    (2029, &[
        "01-01", "02-13", "02-14", "02-15", "02-16", "02-19",
        "04-04", "04-05", "05-01", "05-02", "05-03", "06-18", "09-24",
        "10-01", "10-02", "10-03", "10-04", "10-05",
    ]),
    (2030, &[
        "01-01", "02-04", "02-05", "02-06", "02-07", "02-08",
        "04-04", "04-05", "05-01", "05-02", "05-03", "06-05", "09-12",
        "10-01", "10-02", "10-03", "10-04", "10-07",
    ]),
];

/// HKEX weekday closures (full-day only; half days still trade).
const HK_CLOSURES: &[(i32, &[&str])] = &[
    (2020, &[
        "01-01", "01-27", "01-28", "04-10", "04-13", "04-30", "05-01",
        "06-25", "07-01", "10-01", "10-02", "10-26", "12-25",
    ]),
    (2021, &[
        "01-01", "02-12", "02-15", "04-02", "04-05", "04-06", "05-19",
        "06-14", "07-01", "09-22", "10-01", "10-14", "12-27",
    ]),
    (2022, &[
        "02-01", "02-02", "02-03", "04-05", "04-15", "04-18", "05-02",
        "05-09", "06-03", "07-01", "09-12", "10-04", "12-26", "12-27",
    ]),
    (2023, &[
        "01-02", "01-23", "01-24", "01-25", "04-05", "04-07", "04-10",
        "05-01", "05-26", "06-22", "10-02", "10-23", "12-25", "12-26",
    ]),
    (2024, &[
        "01-01", "02-12", "02-13", "03-29", "04-01", "04-04", "05-01",
        "05-15", "06-10", "07-01", "09-18", "10-01", "10-11", "12-25", "12-26",
    ]),
    (2025, &[
        "01-01", "01-29", "01-30", "01-31", "04-04", "04-18", "04-21",
        "05-01", "05-05", "07-01", "10-01", "10-07", "10-29", "12-25", "12-26",
    ]),
    (2026, &[
        "01-01", "02-17", "02-18", "02-19", "04-03", "04-06", "04-07",
        "05-01", "05-25", "06-19", "07-01", "09-28", "10-01", "10-19", "12-25",
    ]),
    (2027, &[
        "01-01", "02-08", "02-09", "03-26", "03-29", "04-05", "05-13",
        "06-09", "07-01", "09-16", "10-01", "10-08", "12-27",
    ]),
    (2028, &[
        "01-03", "01-26", "01-27", "01-28", "04-04", "04-14", "04-17",
        "05-01", "05-02", "05-29", "10-02", "10-04", "10-26", "12-25", "12-26",
    ]),
    (2029, &[
        "01-01", "02-13", "02-14", "02-15", "03-30", "04-02", "04-04",
        "05-01", "05-21", "06-18", "07-02", "09-24", "10-01", "10-16", "12-25", "12-26",
    ]),
    (2030, &[
        "01-01", "02-04", "02-05", "02-06", "04-04", "04-19", "04-22",
        "05-01", "05-09", "06-05", "07-01", "09-13", "10-01", "10-25", "12-25", "12-26",
    ]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn cny_week_closed_in_shanghai() {
        assert!(cn_holiday(d(2025, 1, 29)));
        assert!(cn_holiday(d(2024, 2, 14)));
        assert!(!cn_holiday(d(2024, 2, 19)));
    }

    #[test]
    fn hk_trades_through_mainland_golden_week_tail() {
        // Mainland closes Oct 1-7; HKEX reopens after National Day.
        assert!(cn_holiday(d(2024, 10, 4)));
        assert!(!hk_holiday(d(2024, 10, 4)));
    }

    #[test]
    fn out_of_range_fails_open() {
        assert!(!cn_holiday(d(2035, 10, 1)));
        assert!(!hk_holiday(d(2035, 12, 25)));
    }
}
