//! Diagnostics go to stderr so the profit table on stdout stays clean.
//! Only warnings (skipped records, failed lookups) are shown unless
//! `--verbose` is given; `RUST_LOG` overrides both.
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

fn crate_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    }
}

pub fn init_logging(verbose: bool) {
    let level = crate_level(verbose);
    let crate_filter = Targets::new().with_target("coinpnl", level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time().with_writer(std::io::stderr))
        .with(crate_filter)
        .with(env_filter)
        .init();
}
