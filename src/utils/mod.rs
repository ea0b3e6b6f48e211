//! Utility modules shared by the library and the binary

pub mod env;
pub mod logging;
pub mod signal;

// Re-export commonly used items
pub use env::env_opt;
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use signal::wait_for_shutdown_signal;
