//! Logger setup for the `pbir` binary.
//!
//! The library crates log through the `log` facade. The subscriber installed here bridges those
//! records into `tracing` and writes them to stderr, leaving stdout to the command's report.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: [&str; 4] = ["pbir_cli", "pbir_report", "pbir_fs", "pbir_dax"];

fn directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Filter for the given flags.
///
/// `--verbose` wins over `--quiet`; without either, `RUST_LOG` applies when set and valid,
/// otherwise the pbir crates log at info.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(directives("debug"))
    } else if quiet {
        EnvFilter::new(directives("error"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives("info")))
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logger(verbose: bool, quiet: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .try_init();
}
