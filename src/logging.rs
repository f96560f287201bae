//! Logger setup for the command-line front end.

use std::io::Write;

/// Initialise `env_logger`. `RUST_LOG` wins over the level chosen here.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level_tag(record.level()),
                record.args()
            )
        })
        .try_init();
}

fn level_tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags_are_three_chars() {
        for level in [
            log::Level::Error,
            log::Level::Warn,
            log::Level::Info,
            log::Level::Debug,
            log::Level::Trace,
        ] {
            assert_eq!(level_tag(level).len(), 3);
        }
    }
}
