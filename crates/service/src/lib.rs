//! embserve service library: request dispatch, TCP server, logging and metrics.

pub mod bootstrap;
pub mod dispatcher;
mod logging;
pub mod metrics;
pub mod server;
pub mod status;

pub use bootstrap::{build_service, load_service, run_app};
pub use dispatcher::{EmbeddingService, RequestHandler, distance_metric};
pub use logging::init_tracing_with_config;
pub use metrics::{ServiceMetrics, scrape_metrics};
