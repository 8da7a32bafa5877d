pub mod app;
pub mod events;
pub mod runner;
pub mod ui;
pub mod widgets;

pub use runner::run_dashboard;
