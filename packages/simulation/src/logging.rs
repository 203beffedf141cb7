//! Logger setup for the simulation binary.

use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "tunnel=trace";
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "tunnel=info";

/// Installs `pretty_env_logger` with thread names in every line.
///
/// Filters come from `RUST_LOG`, falling back to `tunnel=info`
/// (`tunnel=trace` in debug builds). Building with the `NO_LOG` env var set
/// skips installation entirely.
///
/// # Errors
///
/// * If a global logger has already been installed
pub fn init() -> Result<(), log::SetLoggerError> {
    const NO_LOG: bool = std::option_env!("NO_LOG").is_some();

    if NO_LOG {
        return Ok(());
    }

    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .format(|buf, record| {
            static MAX_THREAD_PREFIX_LEN: AtomicUsize = AtomicUsize::new(0);
            static MAX_LEVEL_PREFIX_LEN: AtomicUsize = AtomicUsize::new(0);

            use std::io::Write as _;

            use pretty_env_logger::env_logger::fmt::Color;

            let mut style = buf.style();
            let level = record.level();
            let level_style = style.set_color(match level {
                log::Level::Error => Color::Red,
                log::Level::Warn => Color::Yellow,
                log::Level::Info => Color::Green,
                log::Level::Debug => Color::Blue,
                log::Level::Trace => Color::Magenta,
            });

            let current = std::thread::current();
            let thread_name = current.name().unwrap_or("unnamed");
            let ts = buf.timestamp_millis();
            let level_prefix_len = "[]".len() + level.to_string().len();
            let thread_prefix_len = "[]".len() + thread_name.len();

            let max_level_prefix_len = MAX_LEVEL_PREFIX_LEN
                .fetch_max(level_prefix_len, Ordering::SeqCst)
                .max(level_prefix_len);
            let level_padding = max_level_prefix_len - level_prefix_len;

            let max_thread_prefix_len = MAX_THREAD_PREFIX_LEN
                .fetch_max(thread_prefix_len, Ordering::SeqCst)
                .max(thread_prefix_len);
            let thread_padding = max_thread_prefix_len - thread_prefix_len;

            writeln!(
                buf,
                "\
                [{ts}] \
                [{thread_name}] {empty:<thread_padding$}\
                [{level}] {empty:<level_padding$}\
                {args}\
                ",
                empty = "",
                level = level_style.value(level),
                args = record.args(),
            )
        })
        .try_init()
}
