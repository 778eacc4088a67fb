pub mod config;
pub mod db;
pub mod handover; // Lifecycle, versioning, window resolution
pub mod models;

pub use handover::{
    CreateHandover, ExpirySweep, HandoverError, HandoverService, TransitionRequest,
};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config::default_log_filter()` applies.
/// Safe to call more than once: later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
