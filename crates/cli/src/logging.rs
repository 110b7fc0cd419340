use chrono::Local;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pick the log level: an explicit level wins over `LOG_LEVEL`, which wins
/// over the default.
pub fn resolve_level(explicit: Option<&str>, env: Option<String>) -> String {
    explicit
        .map(str::to_string)
        .or(env)
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// `<timestamp> [<level>] <message>`
pub fn template(timestamp: &str, level: &str, message: &str) -> String {
    format!("{} [{}] {}", timestamp, level, message)
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// Map npm-style level names onto `tracing` directives.
fn directive_for(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "verbose" | "silly" => "trace".to_string(),
        other => other.to_string(),
    }
}

/// Unknown level names fall back to `info`. A bare word would otherwise
/// parse as a target directive and silence every event.
fn level_filter(level: &str) -> LevelFilter {
    LevelFilter::from_str(&directive_for(level)).unwrap_or(LevelFilter::INFO)
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .parse_lossy("")
}

/// One line per event in the `template` layout.
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut message), event)?;
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        writeln!(
            writer,
            "{}",
            template(&timestamp, level_name(event.metadata().level()), &message)
        )
    }
}

pub fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .event_format(LineFormat)
        .with_env_filter(filter_for(level))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_by_default() {
        assert_eq!(resolve_level(None, None), "info");
        assert_eq!(resolve_level(None, Some(String::new())), "info");
    }

    #[test]
    fn test_env_level() {
        assert_eq!(resolve_level(None, Some("warning".to_string())), "warning");
    }

    #[test]
    fn test_explicit_level_wins() {
        assert_eq!(
            resolve_level(Some("error"), Some("debug".to_string())),
            "error"
        );
    }

    #[test]
    fn test_template() {
        assert_eq!(
            template("timestamp", "level", "message"),
            "timestamp [level] message"
        );
    }

    #[test]
    fn test_level_aliases() {
        assert_eq!(directive_for("warning"), "warn");
        assert_eq!(directive_for("DEBUG"), "debug");
        assert_eq!(directive_for("error"), "error");
        assert_eq!(level_filter("warning"), LevelFilter::WARN);
        assert_eq!(level_filter("verbose"), LevelFilter::TRACE);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(level_filter("verbos"), LevelFilter::INFO);
        assert_eq!(level_filter("Info!"), LevelFilter::INFO);
        assert_eq!(level_filter("error"), LevelFilter::ERROR);
    }

    #[test]
    fn test_mistyped_level_keeps_errors_visible() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter_for(&resolve_level(None, Some("verbos".to_string()))))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::ERROR));
            assert!(tracing::enabled!(Level::INFO));
            assert!(!tracing::enabled!(Level::DEBUG));
        });
    }
}
