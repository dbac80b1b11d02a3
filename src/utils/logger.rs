use env_logger::{Builder, Env, Target};
use std::io::Write;

/// Installs the process-wide logger.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// when `verbose` is on.
pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
