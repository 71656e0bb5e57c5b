pub mod bootstrap;
pub mod commands;
pub mod oauth;
pub mod presenter;
pub mod scheduler;
pub mod task_store;
