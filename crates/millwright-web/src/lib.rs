//! Web front end for Millwright
//!
//! Server-rendered pages over the machine repository, gated by the session
//! principal established at login.

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;
pub mod views;

pub use metrics::MetricsRecorder;
pub use server::{build_router, AppState, WebServer};
