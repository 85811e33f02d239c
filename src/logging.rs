//! Diagnostics go to stderr through `tracing`; user-facing output stays on stdout.

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ACME_LOG";

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,acme=debug"
    } else {
        "warn,acme=info"
    }
}

/// Install the global subscriber. `ACME_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_crate_level() {
        assert_eq!(default_directives(true), "warn,acme=debug");
        assert_eq!(default_directives(false), "warn,acme=info");
    }
}
