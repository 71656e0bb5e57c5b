pub mod calendar_grid;
pub mod lunar;
pub mod models;
pub mod recurrence;
