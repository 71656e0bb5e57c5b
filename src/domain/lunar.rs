//! Vietnamese lunisolar date for a solar day.
//!
//! Astronomical new moons and solar terms are evaluated at UTC+7, so month
//! starts follow the Vietnamese calendar (which differs from the Chinese one
//! in a handful of years). Accurate for 1900..=2199.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::f64::consts::PI;

pub const VIETNAM_UTC_OFFSET_HOURS: f64 = 7.0;

const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1900..=2199;
const SYNODIC_MONTH: f64 = 29.530588853;
const JULIAN_DAY_OF_CE: i64 = 1_721_425;
const NEW_MOON_EPOCH: f64 = 2_415_021.076998695;

const STEMS: [&str; 10] = [
    "Giáp", "Ất", "Bính", "Đinh", "Mậu", "Kỷ", "Canh", "Tân", "Nhâm", "Quý",
];
const BRANCHES: [&str; 12] = [
    "Tý", "Sửu", "Dần", "Mão", "Thìn", "Tỵ", "Ngọ", "Mùi", "Thân", "Dậu", "Tuất", "Hợi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LunarDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    /// Intercalary month, repeating the number of the month before it.
    pub leap: bool,
}

impl LunarDate {
    pub fn from_solar(date: NaiveDate, utc_offset_hours: f64) -> Option<Self> {
        if !SUPPORTED_YEARS.contains(&date.year()) {
            return None;
        }
        let tz = utc_offset_hours;
        let day_number = julian_day(date);
        let k = ((day_number as f64 - NEW_MOON_EPOCH) / SYNODIC_MONTH).floor() as i64;
        let mut month_start = new_moon_day(k + 1, tz);
        if month_start > day_number {
            month_start = new_moon_day(k, tz);
        }

        let mut a11 = lunar_month_11(date.year(), tz);
        let mut b11 = a11;
        let mut year = date.year();
        if a11 >= month_start {
            a11 = lunar_month_11(date.year() - 1, tz);
        } else {
            year += 1;
            b11 = lunar_month_11(date.year() + 1, tz);
        }

        let day = day_number - month_start + 1;
        let diff = (month_start - a11).div_euclid(29);
        let mut month = diff + 11;
        let mut leap = false;
        if b11 - a11 > 365 {
            let leap_offset = leap_month_offset(a11, tz);
            if diff >= leap_offset {
                month = diff + 10;
                leap = diff == leap_offset;
            }
        }
        if month > 12 {
            month -= 12;
        }
        if month >= 11 && diff < 4 {
            year -= 1;
        }

        Some(Self {
            day: u32::try_from(day).ok()?,
            month: u32::try_from(month).ok()?,
            year,
            leap,
        })
    }

    /// Sexagenary name of the lunar year, e.g. "Bính Ngọ".
    pub fn year_name(&self) -> String {
        let stem = STEMS[(self.year + 6).rem_euclid(10) as usize];
        let branch = BRANCHES[(self.year + 8).rem_euclid(12) as usize];
        format!("{stem} {branch}")
    }
}

fn julian_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) + JULIAN_DAY_OF_CE
}

/// Julian date of the `k`-th new moon after 1900-01-01.
fn new_moon(k: i64) -> f64 {
    let k = k as f64;
    let t = k / 1236.85;
    let t2 = t * t;
    let t3 = t2 * t;
    let dr = PI / 180.0;

    let mut jd = 2_415_020.75933 + 29.53058868 * k + 0.0001178 * t2 - 0.000000155 * t3;
    jd += 0.00033 * ((166.56 + 132.87 * t - 0.009173 * t2) * dr).sin();
    let m = 359.2242 + 29.10535608 * k - 0.0000333 * t2 - 0.00000347 * t3;
    let mpr = 306.0253 + 385.81691806 * k + 0.0107306 * t2 + 0.00001236 * t3;
    let f = 21.2964 + 390.67050646 * k - 0.0016528 * t2 - 0.00000239 * t3;

    let mut c1 = (0.1734 - 0.000393 * t) * (m * dr).sin() + 0.0021 * (2.0 * dr * m).sin();
    c1 -= 0.4068 * (mpr * dr).sin() - 0.0161 * (2.0 * dr * mpr).sin();
    c1 -= 0.0004 * (3.0 * dr * mpr).sin();
    c1 += 0.0104 * (2.0 * dr * f).sin() - 0.0051 * (dr * (m + mpr)).sin();
    c1 -= 0.0074 * (dr * (m - mpr)).sin() - 0.0004 * (dr * (2.0 * f + m)).sin();
    c1 -= 0.0004 * (dr * (2.0 * f - m)).sin() + 0.0006 * (dr * (2.0 * f + mpr)).sin();
    c1 += 0.0010 * (dr * (2.0 * f - mpr)).sin() + 0.0005 * (dr * (2.0 * mpr + m)).sin();

    let delta_t = if t < -11.0 {
        0.001 + 0.000839 * t + 0.0002261 * t2 - 0.00000845 * t3 - 0.000000081 * t * t3
    } else {
        -0.000278 + 0.000265 * t + 0.000262 * t2
    };
    jd + c1 - delta_t
}

fn new_moon_day(k: i64, tz: f64) -> i64 {
    (new_moon(k) + 0.5 + tz / 24.0).floor() as i64
}

/// Apparent solar longitude in radians, normalized to 0..2π.
fn sun_longitude(jd: f64) -> f64 {
    let t = (jd - 2_451_545.0) / 36525.0;
    let t2 = t * t;
    let dr = PI / 180.0;
    let m = 357.52910 + 35999.05030 * t - 0.0001559 * t2 - 0.00000048 * t * t2;
    let l0 = 280.46645 + 36000.76983 * t + 0.0003032 * t2;
    let mut dl = (1.914600 - 0.004817 * t - 0.000014 * t2) * (dr * m).sin();
    dl += (0.019993 - 0.000101 * t) * (2.0 * dr * m).sin() + 0.000290 * (3.0 * dr * m).sin();
    let l = (l0 + dl) * dr;
    l - 2.0 * PI * (l / (2.0 * PI)).floor()
}

/// Major solar term (0..=11) in effect at local midnight starting `day_number`.
fn solar_term(day_number: i64, tz: f64) -> i64 {
    (sun_longitude(day_number as f64 - 0.5 - tz / 24.0) / PI * 6.0).floor() as i64
}

/// Start of the month containing the winter solstice of `year`.
fn lunar_month_11(year: i32, tz: f64) -> i64 {
    let Some(last_day) = NaiveDate::from_ymd_opt(year, 12, 31) else {
        return 0;
    };
    let offset = julian_day(last_day) - 2_415_021;
    let k = (offset as f64 / SYNODIC_MONTH).floor() as i64;
    let start = new_moon_day(k, tz);
    if solar_term(start, tz) >= 9 {
        new_moon_day(k - 1, tz)
    } else {
        start
    }
}

/// Months after month 11 until the first month without a major solar term.
fn leap_month_offset(a11: i64, tz: f64) -> i64 {
    let k = ((a11 as f64 - NEW_MOON_EPOCH) / SYNODIC_MONTH + 0.5).floor() as i64;
    let mut i = 1;
    let mut term = solar_term(new_moon_day(k + i, tz), tz);
    loop {
        let last = term;
        i += 1;
        term = solar_term(new_moon_day(k + i, tz), tz);
        if term == last || i >= 14 {
            break;
        }
    }
    i - 1
}
