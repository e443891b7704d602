use std::io::Write;

use log::LevelFilter;

/// Render one log line: `[2024-01-01 03:00:00.000] INFO target: message`
pub fn format_line(
    timestamp: chrono::DateTime<chrono::Local>,
    level: log::Level,
    target: &str,
    message: &str,
) -> String {
    format!(
        "[{}] {} {}: {}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        level,
        target,
        message
    )
}

/// Resolve the level used when RUST_LOG does not override it
pub fn level_from_config(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Install the process-wide logger writing leveled text lines to stdout.
///
/// `RUST_LOG` takes precedence over `default_level`. Calling this twice is a
/// no-op rather than a panic so tests and the binary can share it.
pub fn init(default_level: &str) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_from_config(default_level))
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(
                    chrono::Local::now(),
                    record.level(),
                    record.target(),
                    &record.args().to_string()
                )
            )
        });

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_line() {
        let ts = chrono::Local.with_ymd_and_hms(2024, 3, 4, 18, 5, 9).unwrap();
        let line = format_line(ts, log::Level::Warn, "snfs_defrag::batch", "requeued /a/b");
        assert_eq!(line, "[2024-03-04 18:05:09.000] WARN snfs_defrag::batch: requeued /a/b");
    }

    #[test]
    fn test_level_from_config() {
        assert_eq!(level_from_config("debug"), LevelFilter::Debug);
        assert_eq!(level_from_config("WARN"), LevelFilter::Warn);
        assert_eq!(level_from_config("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init("info");
        init("debug");
    }
}
