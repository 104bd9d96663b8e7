//! Logging setup
//!
//! The engine logs through `tracing` macros; binaries call [`init`] once at startup.
//! `RELEASE_RAIL_LOG` (or `RUST_LOG`) overrides the verbosity-derived default filter.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`
pub const LOG_ENV: &str = "RELEASE_RAIL_LOG";

/// Map `-v` occurrences to a default filter directive
pub fn default_directive(verbosity: u8) -> &'static str {
  match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  }
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(verbosity: u8, json: bool) {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false);

  let result = if json {
    builder.json().try_init()
  } else {
    builder.try_init()
  };

  if let Err(err) = result {
    tracing::debug!("logging already initialized: {}", err);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_verbosity_levels() {
    assert_eq!(default_directive(0), "warn");
    assert_eq!(default_directive(1), "info");
    assert_eq!(default_directive(2), "debug");
    assert_eq!(default_directive(9), "trace");
  }

  #[test]
  fn test_init_twice_is_harmless() {
    init(0, false);
    init(2, true);
  }
}
