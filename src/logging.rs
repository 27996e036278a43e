//! Logger setup
//!
//! Filters come from `LIVE_PERCEPTION_LOG` when it is set, otherwise from
//! `RUST_LOG`, otherwise from the caller's default.

use env_logger::Env;

/// Crate-specific filter variable.
pub const LOG_ENV: &str = "LIVE_PERCEPTION_LOG";

fn filter_var(crate_var_set: bool) -> &'static str {
    if crate_var_set {
        LOG_ENV
    } else {
        env_logger::DEFAULT_FILTER_ENV
    }
}

/// Install the global logger. Fails if one is already installed.
pub fn init_logging(default_filter: &str) -> Result<(), log::SetLoggerError> {
    let var = filter_var(std::env::var_os(LOG_ENV).is_some());
    env_logger::Builder::from_env(Env::default().filter_or(var, default_filter)).try_init()
}
