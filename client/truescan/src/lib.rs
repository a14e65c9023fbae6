pub mod analysis;
pub mod api;
pub mod app;
pub mod auth;
pub mod backoff;
pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod poller;
pub mod search;
pub mod stores;
pub mod transport;

pub use app::AppServices;
pub use cancel::CancelSignal;
pub use config::{load_config, ClientConfig};
pub use error::{ApiError, PollError, ServiceError};
pub use poller::{EarlyAccept, PollerConfig, TaskPoller};
