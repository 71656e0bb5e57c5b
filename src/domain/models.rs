use crate::domain::lunar::LunarDate;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_POSITION: &str = "00000000000000000000";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    NeedsAction,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsAction => "needsAction",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "needsAction" => Some(Self::NeedsAction),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::NeedsAction => Self::Completed,
            Self::Completed => Self::NeedsAction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub notes: String,
    pub due: NaiveDate,
    pub status: TaskStatus,
    pub position: String,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Tasks grouped by due date, each day ordered by descending `position`.
///
/// A bucket is built in one pass by [`TaskBucket::from_tasks`] and never
/// edited afterwards; a newer sync produces a whole new bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskBucket {
    by_date: BTreeMap<NaiveDate, Vec<Task>>,
}

impl TaskBucket {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            by_date.entry(task.due).or_default().push(task);
        }
        for day in by_date.values_mut() {
            day.sort_by(|left, right| right.position.cmp(&left.position));
        }
        Self { by_date }
    }

    pub fn tasks_on(&self, date: NaiveDate) -> &[Task] {
        self.by_date.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.by_date.keys()
    }

    pub fn task_count(&self) -> usize {
        self.by_date.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub belongs_to_displayed_month: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
}

impl IntervalUnit {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Some(Self::Day),
            "week" | "weeks" => Some(Self::Week),
            "month" | "months" => Some(Self::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRequest {
    pub title: String,
    pub notes: String,
    pub start_date: NaiveDate,
    pub interval_count: u32,
    pub interval_unit: IntervalUnit,
    pub occurrences: u32,
}

impl RecurrenceRequest {
    pub fn single(title: impl Into<String>, notes: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            notes: notes.into(),
            start_date: date,
            interval_count: 1,
            interval_unit: IntervalUnit::Day,
            occurrences: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    #[serde(rename = "token", alias = "access_token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expiry > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .is_some_and(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusGlyph {
    pub day: u32,
    pub weekday_label: String,
    pub lunar: Option<LunarDate>,
}
