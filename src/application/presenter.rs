use crate::application::scheduler::CalendarView;
use crate::domain::calendar_grid::DAYS_PER_WEEK;
use crate::domain::lunar::LunarDate;
use crate::domain::models::StatusGlyph;
use std::fmt::Write as _;
use tracing::info;

/// Consumer of finished calendar state. Implementations only draw; they
/// never call back into the scheduler while rendering.
pub trait Presenter: Send + Sync {
    fn render_grid(&self, view: &CalendarView);
    fn render_status_glyph(&self, glyph: &StatusGlyph);
}

/// Writes every redraw to the log. Used by the daemon, which has no window.
#[derive(Debug, Clone, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn render_grid(&self, view: &CalendarView) {
        info!(
            year = view.year,
            month = view.month,
            tasks = view.bucket.task_count(),
            is_current_month = view.is_current_month,
            error = view.last_error.as_ref().map(ToString::to_string),
            "calendar redrawn\n{}",
            render_text(view, &short_labels())
        );
    }

    fn render_status_glyph(&self, glyph: &StatusGlyph) {
        info!(
            day = glyph.day,
            weekday = %glyph.weekday_label,
            lunar = glyph.lunar.as_ref().map(lunar_label),
            "status glyph updated"
        );
    }
}

/// `Âm lịch: 01/01, 2026`, with `nhuận` appended inside a leap month.
pub fn lunar_label(date: &LunarDate) -> String {
    let leap = if date.leap { " nhuận" } else { "" };
    format!("Âm lịch: {:02}/{:02}{leap}, {}", date.day, date.month, date.year)
}

pub fn short_labels() -> [String; DAYS_PER_WEEK] {
    ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"].map(String::from)
}

/// Plain-text month grid, headed by today's lunar date and followed by the
/// tasks of the displayed month.
///
/// Days outside the displayed month are dimmed with parentheses, today is
/// bracketed and days with open tasks carry a `*`.
pub fn render_text(view: &CalendarView, header: &[String; DAYS_PER_WEEK]) -> String {
    let mut out = String::new();
    if let Some(lunar) = &view.status.lunar {
        let _ = writeln!(out, "{} ({})", lunar_label(lunar), lunar.year_name());
    }
    let _ = writeln!(out, "{:^34}", format!("{:02}/{}", view.month, view.year));
    for label in header {
        let _ = write!(out, "{label:>5}");
    }
    out.push('\n');

    for week in view.grid.weeks() {
        for cell in week {
            let day = cell.date.format("%-d").to_string();
            let open = view
                .bucket
                .tasks_on(cell.date)
                .iter()
                .any(|task| !task.is_completed());
            let marker = if open { "*" } else { " " };
            let label = if cell.is_today {
                format!("[{day}]")
            } else if cell.belongs_to_displayed_month {
                day
            } else {
                format!("({day})")
            };
            let _ = write!(out, "{label:>4}{marker}");
        }
        out.push('\n');
    }

    for cell in view.grid.cells.iter().filter(|cell| cell.belongs_to_displayed_month) {
        for task in view.bucket.tasks_on(cell.date) {
            let check = if task.is_completed() { "x" } else { " " };
            let _ = writeln!(out, "{} [{check}] {} ({})", cell.date, task.title, task.id);
        }
    }

    if let Some(error) = &view.last_error {
        let _ = writeln!(out, "! {error}");
    }
    out
}
