pub mod change_signal;
pub mod client_secret;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod consent;
pub mod credential_store;
pub mod error;
pub mod google_tasks_client;
pub mod logging;
pub mod oauth_client;
pub mod task_mapper;
