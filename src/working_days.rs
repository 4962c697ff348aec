// src/working_days.rs
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{HashMap, HashSet};

/// Precomputed Victorian (AU-VIC) public holiday lookup.
///
/// Built once at process start for the year span the run needs and threaded
/// as a parameter into every working-day check. Queries for a year outside
/// the precomputed span fall back to computing that year's table on the fly,
/// so dates near Dec 31 / Jan 1 always consult the correct year.
pub struct HolidayCalendar {
    years: HashMap<i32, HashSet<NaiveDate>>,
}

impl HolidayCalendar {
    pub fn for_year_range(first_year: i32, last_year: i32) -> Self {
        let mut years = HashMap::new();
        for year in first_year..=last_year {
            years.insert(year, vic_holidays_for_year(year));
        }
        Self { years }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        match self.years.get(&date.year()) {
            Some(set) => set.contains(&date),
            None => vic_holidays_for_year(date.year()).contains(&date),
        }
    }
}

/// Working day: ISO weekday Mon-Fri, not a VIC public holiday, not a
/// caller-supplied skip date. The three checks are independent ANDs.
pub fn is_working_day(
    date: NaiveDate,
    skip_dates: &HashSet<NaiveDate>,
    holidays: &HolidayCalendar,
) -> bool {
    let is_weekday = date.weekday().number_from_monday() <= 5;

    is_weekday && !holidays.is_holiday(date) && !skip_dates.contains(&date)
}

/// Full VIC public holiday table for one year, weekend substitutes included.
pub fn vic_holidays_for_year(year: i32) -> HashSet<NaiveDate> {
    let mut days = HashSet::new();
    let ymd = |m: u32, d: u32| NaiveDate::from_ymd_opt(year, m, d).unwrap();

    // New Year's Day, with following-Monday substitute when on a weekend.
    let new_year = ymd(1, 1);
    days.insert(new_year);
    if let Some(observed) = weekend_substitute(new_year) {
        days.insert(observed);
    }

    // Australia Day (26 Jan), observed the following Monday when on a weekend.
    let australia_day = ymd(1, 26);
    days.insert(australia_day);
    if let Some(observed) = weekend_substitute(australia_day) {
        days.insert(observed);
    }

    // Labour Day: second Monday of March.
    days.insert(nth_weekday(year, 3, Weekday::Mon, 2));

    // Easter block: Good Friday through Easter Monday.
    let easter = easter_sunday(year);
    days.insert(easter - Duration::days(2));
    days.insert(easter - Duration::days(1));
    days.insert(easter);
    days.insert(easter + Duration::days(1));

    // ANZAC Day: 25 April, no substitute in Victoria.
    days.insert(ymd(4, 25));

    // King's Birthday: second Monday of June.
    days.insert(nth_weekday(year, 6, Weekday::Mon, 2));

    // Friday before the AFL Grand Final.
    if let Some(gf_friday) = grand_final_friday(year) {
        days.insert(gf_friday);
    }

    // Melbourne Cup: first Tuesday of November.
    days.insert(nth_weekday(year, 11, Weekday::Tue, 1));

    // Christmas Day and Boxing Day with substitutes (25th on a weekend adds
    // the 27th, 26th on a weekend adds the 28th).
    let christmas = ymd(12, 25);
    let boxing = ymd(12, 26);
    days.insert(christmas);
    days.insert(boxing);
    if is_weekend(christmas) {
        days.insert(ymd(12, 27));
    }
    if is_weekend(boxing) {
        days.insert(ymd(12, 28));
    }

    days
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn weekend_substitute(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => Some(date + Duration::days(2)),
        Weekday::Sun => Some(date + Duration::days(1)),
        _ => None,
    }
}

/// The nth occurrence of `weekday` in the given month.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset =
        (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days(offset as i64 + 7 * (n as i64 - 1))
}

/// Anonymous Gregorian computus.
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

/// Grand Final Friday. Gazetted year by year; known dates are tabled and
/// other years fall back to the Friday before the last Saturday of September.
fn grand_final_friday(year: i32) -> Option<NaiveDate> {
    let known = match year {
        2015 => Some((10, 2)),
        2016 => Some((9, 30)),
        2017 => Some((9, 29)),
        2018 => Some((9, 28)),
        2019 => Some((9, 27)),
        2020 => Some((10, 23)),
        2021 => Some((9, 24)),
        2022 => Some((9, 23)),
        2023 => Some((9, 29)),
        2024 => Some((9, 27)),
        2025 => Some((9, 26)),
        _ => None,
    };
    if let Some((m, d)) = known {
        return NaiveDate::from_ymd_opt(year, m, d);
    }
    if year < 2015 {
        // Only a public holiday since 2015.
        return None;
    }
    let mut day = NaiveDate::from_ymd_opt(year, 9, 30).unwrap();
    while day.weekday() != Weekday::Sat {
        day -= Duration::days(1);
    }
    Some(day - Duration::days(1))
}
