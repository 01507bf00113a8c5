use burrow_telemetry::LogFormat;
use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};

pub const REDIS_URL_ENV: &str = "BURROW_FLUSHER_REDIS_URL";
pub const STREAM_ENV: &str = "BURROW_FLUSHER_STREAM";
pub const DEAD_LETTER_STREAM_ENV: &str = "BURROW_FLUSHER_DEAD_LETTER_STREAM";
pub const GROUP_ENV: &str = "BURROW_FLUSHER_GROUP";
pub const CONSUMER_ENV: &str = "BURROW_FLUSHER_CONSUMER";
pub const MYSQL_DSN_ENV: &str = "BURROW_FLUSHER_MYSQL_DSN";
pub const MAX_BATCH_SIZE_ENV: &str = "BURROW_FLUSHER_MAX_BATCH_SIZE";
pub const MAX_WAIT_MS_ENV: &str = "BURROW_FLUSHER_MAX_WAIT_MS";
pub const MAX_FLUSH_ATTEMPTS_ENV: &str = "BURROW_FLUSHER_MAX_FLUSH_ATTEMPTS";
pub const LOG_FORMAT_ENV: &str = "BURROW_FLUSHER_LOG_FORMAT";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_STREAM: &str = "burrow:mappings";
pub const DEFAULT_DEAD_LETTER_STREAM: &str = "burrow:mappings:dlq";
pub const DEFAULT_GROUP: &str = "burrow-flusher";
pub const DEFAULT_CONSUMER: &str = "flusher-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "pretty")]
    Pretty,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Pretty => write!(f, "pretty"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Drains the mapping stream into MySQL in batches.
#[derive(Debug, Parser)]
#[command(name = "burrow-flusher")]
pub struct Cli {
    #[arg(long, env = REDIS_URL_ENV, default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,

    #[arg(long, env = STREAM_ENV, default_value = DEFAULT_STREAM)]
    pub stream: String,

    #[arg(long, env = DEAD_LETTER_STREAM_ENV, default_value = DEFAULT_DEAD_LETTER_STREAM)]
    pub dead_letter_stream: String,

    #[arg(long, env = GROUP_ENV, default_value = DEFAULT_GROUP)]
    pub group: String,

    #[arg(long, env = CONSUMER_ENV, default_value = DEFAULT_CONSUMER)]
    pub consumer: String,

    #[arg(long, env = MYSQL_DSN_ENV)]
    pub mysql_dsn: String,

    #[arg(
        long,
        env = MAX_BATCH_SIZE_ENV,
        default_value_t = 200,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_batch_size: u64,

    #[arg(long, env = MAX_WAIT_MS_ENV, default_value_t = 500)]
    pub max_wait_ms: u64,

    #[arg(long, env = MAX_FLUSH_ATTEMPTS_ENV, default_value_t = 3)]
    pub max_flush_attempts: u32,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["burrow-flusher", "--mysql-dsn", "mysql://u:p@db/burrow"])
            .unwrap();

        assert_eq!(cli.stream, DEFAULT_STREAM);
        assert_eq!(cli.group, DEFAULT_GROUP);
        assert_eq!(cli.max_batch_size, 200);
        assert_eq!(cli.max_wait_ms, 500);
        assert_eq!(cli.log_format, LogFormatArg::Pretty);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let parsed = Cli::try_parse_from([
            "burrow-flusher",
            "--mysql-dsn",
            "mysql://u:p@db/burrow",
            "--max-batch-size",
            "0",
        ]);
        assert!(parsed.is_err());
    }
}
