mod controller;
mod lifecycle;
mod orchestrator;
mod prerequisites;
mod readiness;

pub use controller::AppController;
pub use orchestrator::{BackendStatus, RemoveOutcome, StartReport, StartRequest};
