use std::io::Write;

/// Environment variable holding the log filter, e.g. `CHESS_LOG=debug`.
pub const LOG_ENV: &str = "CHESS_LOG";

/// Default filter for a given `-v` count.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the stderr logger. `CHESS_LOG` overrides the verbosity flag.
pub fn init(verbosity: u8) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(LOG_ENV, default_filter(verbosity)),
    );

    builder
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Stderr);

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(2), "debug");
        assert_eq!(default_filter(9), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0);
        init(2);
        log::warn!("logger installed");
    }
}
