use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

use crate::verbosity::Verbosity;

/// Initialize the logging system with the given verbosity level.
///
/// `RUST_LOG`, when set, takes precedence over the CLI flags.
pub(crate) fn init_logging(verbose: &Verbosity) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();

        // Dependencies (reqwest, hyper) stay quiet unless something is wrong
        builder.filter_level(LevelFilter::Warn);
        builder
            .filter_module("apiqueue", level_filter)
            .filter_module("apiqueue_lib", level_filter);
    }

    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    builder.init();
}
