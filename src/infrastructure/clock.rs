use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Shared source of "now"; swapped for a fixed instant in tests.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_now() -> NowProvider {
    Arc::new(Utc::now)
}

/// Maps an instant to the calendar date the user is living in: the
/// configured IANA zone when there is one, the system zone otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalCalendar {
    zone: Option<Tz>,
}

impl LocalCalendar {
    pub fn new(zone: Option<Tz>) -> Self {
        Self { zone }
    }

    pub fn from_name(name: Option<&str>) -> Self {
        Self::new(name.and_then(|value| value.trim().parse::<Tz>().ok()))
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        match self.zone {
            Some(zone) => now.with_timezone(&zone).date_naive(),
            None => now.with_timezone(&Local).date_naive(),
        }
    }

    /// Time left until the next local midnight, never zero.
    pub fn until_next_midnight(&self, now: DateTime<Utc>) -> std::time::Duration {
        let tomorrow = self
            .today(now)
            .succ_opt()
            .and_then(|date| date.and_hms_opt(0, 0, 0));
        let next = tomorrow.and_then(|naive| match self.zone {
            Some(zone) => naive
                .and_local_timezone(zone)
                .earliest()
                .map(|at| at.with_timezone(&Utc)),
            None => naive
                .and_local_timezone(Local)
                .earliest()
                .map(|at| at.with_timezone(&Utc)),
        });

        let fallback = std::time::Duration::from_secs(60);
        let Some(next) = next else {
            return fallback;
        };
        (next - now)
            .to_std()
            .ok()
            .filter(|left| !left.is_zero())
            .unwrap_or(fallback)
    }
}
