pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod sync;
pub mod task_input;
pub mod task_list;
pub mod ui;
