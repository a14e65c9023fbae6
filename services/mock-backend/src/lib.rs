//! In-memory stand-in for the TrueScan backend, used for local runs and
//! end-to-end tests of the client.

pub mod app;
pub mod handlers;
pub mod models;
pub mod service;
pub mod state;

pub use app::build_router;
pub use state::{AppState, Scenario};
