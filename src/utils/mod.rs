// Shared utilities module
pub mod config_loader;
pub mod errors;
pub mod hash;
pub mod logging;
pub mod ui;
pub mod watch;

pub use errors::*;
pub use logging::*;
