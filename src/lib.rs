pub mod config;
pub mod dag;
pub mod errors;
pub mod invoker;
pub mod logging;
pub mod report;
pub mod settings;
pub mod ui;
