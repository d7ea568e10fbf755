//! HTTP API handlers for prdesk-ingest

pub mod diagnostics;
pub mod health;
pub mod review;
pub mod webhook;

pub use diagnostics::diagnostic_routes;
pub use health::health_routes;
pub use review::review_routes;
pub use webhook::webhook_routes;
