//! # Telemetry
//!
//! JSON structured logging through `tracing-subscriber`.

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Directive applied when none is given
pub const DEFAULT_DIRECTIVE: &str = "waymark_core=info";

/// Install a global JSON subscriber filtered by `RUST_LOG`
///
/// `default_directive` (e.g. `waymark_core=debug`) is added on top of the
/// environment filter; an unparsable directive falls back to
/// [`DEFAULT_DIRECTIVE`]. Returns `false` if a global subscriber was already
/// installed, so calling this more than once is harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    let directive = default_directive
        .parse::<Directive>()
        .or_else(|_| DEFAULT_DIRECTIVE.parse::<Directive>());

    let filter = match directive {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init()
        .is_ok()
}
