use crate::domain::models::{Task, TaskStatus, DEFAULT_POSITION};
use chrono::{DateTime, NaiveDate, Utc};

/// Task resource as the Google Tasks API serializes it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    // Explicit null clears the completion timestamp on PUT.
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

pub fn format_due_start(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

pub fn format_due_end(date: NaiveDate) -> String {
    format!("{}T23:59:59.999Z", date.format("%Y-%m-%d"))
}

pub fn format_completed(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Date component of a `due` value. The API stores due dates as UTC
/// midnight, so the calendar date is read without any zone shift.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Decodes a listed task; `None` for tasks without an id or a usable due date.
pub fn decode_task(task: GoogleTask) -> Option<Task> {
    let id = task.id.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())?;
    let due = task.due.as_deref().and_then(parse_due_date)?;
    let status = task
        .status
        .as_deref()
        .and_then(TaskStatus::parse)
        .unwrap_or(TaskStatus::NeedsAction);
    let position = task
        .position
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_POSITION.to_string());

    Some(Task {
        id,
        title: task.title.unwrap_or_default(),
        notes: task.notes.unwrap_or_default(),
        due,
        status,
        position,
    })
}

pub fn encode_new_task(title: &str, notes: &str, due: NaiveDate) -> GoogleTask {
    let notes = notes.trim();
    GoogleTask {
        title: Some(title.trim().to_string()),
        notes: (!notes.is_empty()).then(|| notes.to_string()),
        due: Some(format_due_start(due)),
        status: Some(TaskStatus::NeedsAction.as_str().to_string()),
        ..GoogleTask::default()
    }
}

/// Applies a status change to a fetched resource, keeping every other field.
pub fn apply_status(task: &mut GoogleTask, status: TaskStatus, now: DateTime<Utc>) {
    task.status = Some(status.as_str().to_string());
    task.completed = match status {
        TaskStatus::Completed => Some(format_completed(now)),
        TaskStatus::NeedsAction => None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn range_bounds_use_whole_day_timestamps() {
        assert_eq!(format_due_start(date("2026-02-01")), "2026-02-01T00:00:00.000Z");
        assert_eq!(format_due_end(date("2026-03-15")), "2026-03-15T23:59:59.999Z");
    }

    #[test]
    fn decode_reads_due_date_and_defaults_position() {
        let task = decode_task(GoogleTask {
            id: Some("t1".to_string()),
            title: Some("Pay rent".to_string()),
            due: Some("2026-02-16T00:00:00.000Z".to_string()),
            status: Some("completed".to_string()),
            ..GoogleTask::default()
        })
        .expect("decoded");
        assert_eq!(task.due, date("2026-02-16"));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.position, DEFAULT_POSITION);
        assert_eq!(task.notes, "");
    }

    #[test]
    fn decode_skips_tasks_without_due_or_id() {
        assert!(decode_task(GoogleTask {
            id: Some("t1".to_string()),
            ..GoogleTask::default()
        })
        .is_none());
        assert!(decode_task(GoogleTask {
            id: Some("t1".to_string()),
            due: Some("someday".to_string()),
            ..GoogleTask::default()
        })
        .is_none());
        assert!(decode_task(GoogleTask {
            due: Some("2026-02-16T00:00:00.000Z".to_string()),
            ..GoogleTask::default()
        })
        .is_none());
    }

    #[test]
    fn new_task_body_is_needs_action_at_utc_midnight() {
        let body = serde_json::to_value(encode_new_task(" Gym ", "", date("2024-02-29")))
            .expect("serialize");
        assert_eq!(body["title"], "Gym");
        assert_eq!(body["due"], "2024-02-29T00:00:00.000Z");
        assert_eq!(body["status"], "needsAction");
        assert!(body.get("notes").is_none());
        assert!(body.get("id").is_none());
    }

    #[test]
    fn reopening_clears_completion_timestamp() {
        let now = DateTime::parse_from_rfc3339("2026-02-16T08:30:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let mut task = GoogleTask {
            id: Some("t1".to_string()),
            ..GoogleTask::default()
        };
        apply_status(&mut task, TaskStatus::Completed, now);
        assert_eq!(task.completed.as_deref(), Some("2026-02-16T08:30:00.000Z"));

        apply_status(&mut task, TaskStatus::NeedsAction, now);
        let body = serde_json::to_value(&task).expect("serialize");
        assert_eq!(body["status"], "needsAction");
        assert!(body["completed"].is_null());
    }
}
