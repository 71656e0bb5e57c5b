use crate::domain::models::{IntervalUnit, RecurrenceRequest};
use crate::error::CoreError;
use chrono::{Days, Months, NaiveDate};

/// Upper bound on up-front allocation; longer expansions grow as they go.
const PREALLOCATED_OCCURRENCES: u32 = 512;

pub fn days_in_month(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| {
            let next_first = first.checked_add_months(Months::new(1))?;
            u32::try_from((next_first - first).num_days()).ok()
        })
        .unwrap_or(31)
}

/// Clamps the day to the target month's length; `None` past chrono's range.
fn add_months_clamped(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn advance(date: NaiveDate, count: u32, unit: IntervalUnit) -> Option<NaiveDate> {
    match unit {
        IntervalUnit::Day => date.checked_add_days(Days::new(u64::from(count))),
        IntervalUnit::Week => date.checked_add_days(Days::new(u64::from(count) * 7)),
        IntervalUnit::Month => add_months_clamped(date, count),
    }
}

/// Due dates for a recurring task, each one stepped from the previous date.
pub fn expand(request: &RecurrenceRequest) -> Result<Vec<NaiveDate>, CoreError> {
    if request.occurrences < 1 {
        return Err(CoreError::InvalidRequest(
            "occurrences must be >= 1".to_string(),
        ));
    }
    if request.interval_count < 1 {
        return Err(CoreError::InvalidRequest(
            "interval_count must be >= 1".to_string(),
        ));
    }

    let mut dates =
        Vec::with_capacity(request.occurrences.min(PREALLOCATED_OCCURRENCES) as usize);
    let mut current = request.start_date;
    dates.push(current);

    for _ in 1..request.occurrences {
        current = advance(current, request.interval_count, request.interval_unit).ok_or_else(
            || CoreError::InvalidRequest(format!("recurrence overflows the calendar after {current}")),
        )?;
        dates.push(current);
    }

    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn request(start: &str, interval: u32, unit: IntervalUnit, occurrences: u32) -> RecurrenceRequest {
        RecurrenceRequest {
            title: "Pay rent".to_string(),
            notes: String::new(),
            start_date: date(start),
            interval_count: interval,
            interval_unit: unit,
            occurrences,
        }
    }

    #[test]
    fn monthly_on_the_31st_continues_from_clamped_day() {
        let dates = expand(&request("2024-01-31", 1, IntervalUnit::Month, 3)).expect("expand");
        assert_eq!(
            dates,
            vec![date("2024-01-31"), date("2024-02-29"), date("2024-03-29")]
        );
    }

    #[test]
    fn month_steps_carry_into_next_year() {
        let dates = expand(&request("2025-11-30", 3, IntervalUnit::Month, 2)).expect("expand");
        assert_eq!(dates, vec![date("2025-11-30"), date("2026-02-28")]);
    }

    #[test]
    fn single_occurrence_ignores_interval() {
        let dates = expand(&request("2026-10-18", 2, IntervalUnit::Week, 1)).expect("expand");
        assert_eq!(dates, vec![date("2026-10-18")]);
    }

    #[test]
    fn weekly_and_daily_steps_add_days() {
        let weekly = expand(&request("2026-12-28", 2, IntervalUnit::Week, 3)).expect("expand");
        assert_eq!(
            weekly,
            vec![date("2026-12-28"), date("2027-01-11"), date("2027-01-25")]
        );
        let daily = expand(&request("2028-02-28", 1, IntervalUnit::Day, 3)).expect("expand");
        assert_eq!(
            daily,
            vec![date("2028-02-28"), date("2028-02-29"), date("2028-03-01")]
        );
    }

    #[test]
    fn zero_occurrences_is_rejected() {
        let error = expand(&request("2026-10-18", 1, IntervalUnit::Day, 0)).expect_err("invalid");
        assert!(matches!(error, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let error = expand(&request("2026-10-18", 0, IntervalUnit::Month, 3)).expect_err("invalid");
        assert!(matches!(error, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn huge_month_interval_fails_instead_of_wrapping() {
        for interval in [u32::MAX, i32::MAX as u32, 3_200_000] {
            let error = expand(&request("2026-10-18", interval, IntervalUnit::Month, 2))
                .expect_err("beyond the calendar");
            assert!(matches!(error, CoreError::InvalidRequest(_)));
        }
    }

    #[test]
    fn huge_occurrence_count_does_not_preallocate() {
        let error = expand(&request("2026-10-18", 100_000, IntervalUnit::Month, u32::MAX))
            .expect_err("beyond the calendar");
        assert!(matches!(error, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2100, 2), 28);
        assert_eq!(days_in_month(2026, 12), 31);
        assert_eq!(days_in_month(2026, 13), 31);
    }

    proptest! {
        #[test]
        fn expansion_is_strictly_increasing_with_requested_length(
            offset in 0i64..20000i64,
            interval in 1u32..13u32,
            unit_index in 0usize..3usize,
            occurrences in 1u32..25u32
        ) {
            let unit = [IntervalUnit::Day, IntervalUnit::Week, IntervalUnit::Month][unit_index];
            let start = date("1990-01-01") + chrono::Duration::days(offset);
            let mut req = request("2000-01-01", interval, unit, occurrences);
            req.start_date = start;

            let dates = expand(&req).expect("expand");
            prop_assert_eq!(dates.len(), occurrences as usize);
            prop_assert_eq!(dates[0], start);
            for pair in dates.windows(2) {
                prop_assert!(pair[1] > pair[0]);
                if unit == IntervalUnit::Month {
                    prop_assert!(pair[1].day() <= pair[0].day());
                }
            }
        }
    }
}
