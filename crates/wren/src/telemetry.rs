//! Tracing setup for binaries built on wren.
//!
//! The library crates only emit `tracing` events; installing a subscriber
//! is left to the application. [`init`] installs the usual one: a `fmt`
//! subscriber filtered by `RUST_LOG`, falling back to a default filter.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used (for
/// example `"info"` or `"wren_session=debug,info"`). Calling this more
/// than once is harmless: later calls leave the first subscriber in
/// place and return `false`.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_keeps_first_subscriber() {
        // Either this test installed the subscriber or another one did
        // first; both ways the second call must report it was skipped.
        init("warn");
        assert!(!init("debug"));
    }
}
