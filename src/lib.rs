//! Load-aware HTTP request router.
//!
//! Every inbound request is sent to the registered backend with the lowest
//! observed load, with retries on other backends and a per-backend circuit
//! guard that takes repeatedly failing backends out of rotation.

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use config::schema::RouterConfig;
pub use error::{ForwardError, RouterError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
