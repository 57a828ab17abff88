//! Tracing setup shared by agent binaries.
//!
//! Libraries in this workspace only emit `tracing` events; binaries call
//! [`init_tracing`] once at start-up to print them.

#![warn(missing_docs, clippy::pedantic)]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Directive appended to every filter so HTTP client chatter stays quiet.
const QUIET_TRANSPORT: &str = "hyper=warn";

/// Builds the filter: `RUST_LOG` when set, otherwise `default_directive`.
///
/// # Errors
///
/// Returns an error when `default_directive` is not a valid filter directive.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, ParseError> {
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_directive.to_owned());
    EnvFilter::try_new(format!("{base},{QUIET_TRANSPORT}"))
}

/// Installs a formatting subscriber filtered by [`env_filter`].
///
/// Returns `false` when a global subscriber was already installed (for
/// example by a test harness) or the directive was invalid; in both cases
/// events keep flowing to whatever was there before.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = match env_filter(default_directive) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid log filter `{default_directive}`: {err}");
            return false;
        }
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
