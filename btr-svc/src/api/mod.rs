//! HTTP API handlers for btr-svc

pub mod changes;
pub mod health;
pub mod jobs;
pub mod metrics;

pub use changes::changes_routes;
pub use health::health_routes;
pub use jobs::job_routes;
pub use metrics::metrics_routes;
