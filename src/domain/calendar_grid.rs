use crate::domain::lunar::{LunarDate, VIETNAM_UTC_OFFSET_HOURS};
use crate::domain::models::{CalendarCell, StatusGlyph};
use chrono::{Datelike, Days, NaiveDate};

pub const WEEKS: usize = 6;
pub const DAYS_PER_WEEK: usize = 7;
pub const CELL_COUNT: usize = WEEKS * DAYS_PER_WEEK;

/// Displayable years. Every grid in this range, including its leading and
/// trailing weeks, stays inside chrono's representable dates.
pub const MIN_YEAR: i32 = -262_000;
pub const MAX_YEAR: i32 = 262_000;

/// Folds an out-of-range month into 1..=12, carrying whole years. The
/// resulting year is clamped to `MIN_YEAR..=MAX_YEAR`.
pub fn normalize_month(year: i32, month: i32) -> (i32, u32) {
    let total = i64::from(year) * 12 + i64::from(month) - 1;
    let year = total
        .div_euclid(12)
        .clamp(i64::from(MIN_YEAR), i64::from(MAX_YEAR));
    let month = total.rem_euclid(12) + 1;
    (year as i32, month as u32)
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    let (year, month) = normalize_month(year, i32::try_from(month).unwrap_or(i32::MAX));
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

pub fn first_cell_date(year: i32, month: u32) -> NaiveDate {
    let first = first_of_month(year, month);
    let leading = u64::from(first.weekday().num_days_from_monday());
    first.checked_sub_days(Days::new(leading)).unwrap_or(first)
}

/// First and last dates covered by the grid of `(year, month)`, inclusive.
pub fn grid_range(year: i32, month: u32) -> (NaiveDate, NaiveDate) {
    let start = first_cell_date(year, month);
    let end = start
        .checked_add_days(Days::new(CELL_COUNT as u64 - 1))
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CalendarGrid {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<CalendarCell>,
}

impl CalendarGrid {
    pub fn weeks(&self) -> impl Iterator<Item = &[CalendarCell]> {
        self.cells.chunks(DAYS_PER_WEEK)
    }

    pub fn cell(&self, week: usize, weekday: usize) -> Option<&CalendarCell> {
        if weekday >= DAYS_PER_WEEK {
            return None;
        }
        self.cells.get(week * DAYS_PER_WEEK + weekday)
    }

    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        grid_range(self.year, self.month)
    }
}

pub fn compute_grid(year: i32, month: u32, today: NaiveDate) -> CalendarGrid {
    let (year, month) = normalize_month(year, i32::try_from(month).unwrap_or(i32::MAX));
    let start = first_cell_date(year, month);

    let cells = start
        .iter_days()
        .take(CELL_COUNT)
        .map(|date| {
            CalendarCell {
                date,
                belongs_to_displayed_month: date.year() == year && date.month() == month,
                is_today: date == today,
            }
        })
        .collect();

    CalendarGrid { year, month, cells }
}

pub fn status_glyph(today: NaiveDate, weekday_labels: &[String; DAYS_PER_WEEK]) -> StatusGlyph {
    StatusGlyph {
        day: today.day(),
        weekday_label: weekday_labels[today.weekday().num_days_from_monday() as usize].clone(),
        lunar: LunarDate::from_solar(today, VIETNAM_UTC_OFFSET_HOURS),
    }
}
