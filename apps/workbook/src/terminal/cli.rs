use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, ConfigError, DEFAULT_SERVER, DEFAULT_TERMINAL_ID};
use crate::protocol::DEFAULT_CHUNK_LIMIT;
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "workbook",
    about = "Run a program on a workbook execution server and drive it from this terminal",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("WORKBOOK_BUILD_TIMESTAMP"))
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "WORKBOOK_SERVER",
        default_value = DEFAULT_SERVER,
        help = "Base URL of the server hosting the execution endpoint"
    )]
    pub server: String,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "WORKBOOK_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "WORKBOOK_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a source file, run it, and attach this terminal to its stdio
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "FILE", help = "Program source to submit")]
    pub file: PathBuf,

    #[arg(
        long = "terminal-id",
        env = "WORKBOOK_TERMINAL_ID",
        default_value = DEFAULT_TERMINAL_ID,
        value_name = "ID",
        help = "Terminal the run is attached to"
    )]
    pub terminal_id: String,

    #[arg(
        long = "connect-timeout-secs",
        env = "WORKBOOK_CONNECT_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Give up on the connect attempt after this many seconds (default: wait)"
    )]
    pub connect_timeout_secs: Option<u64>,

    #[arg(
        long = "chunk-limit",
        env = "WORKBOOK_CHUNK_LIMIT",
        default_value_t = DEFAULT_CHUNK_LIMIT,
        value_name = "CHARS",
        help = "Maximum characters per uploaded code fragment"
    )]
    pub chunk_limit: usize,
}

impl RunArgs {
    pub fn to_config(&self, server: &str) -> Result<Config, ConfigError> {
        Ok(Config::new(server)
            .with_terminal_id(self.terminal_id.clone())
            .with_connect_timeout_secs(self.connect_timeout_secs)
            .with_chunk_limit(self.chunk_limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
        }
    }

    #[test]
    fn run_uses_defaults() {
        let cli = Cli::try_parse_from(["workbook", "run", "hello.py"]).expect("parse");
        assert_eq!(cli.logging.level, LogLevel::Warn);
        let server = cli.server.clone();
        let args = run_args(cli);
        assert_eq!(args.file, PathBuf::from("hello.py"));

        let config = args.to_config(&server).expect("config");
        assert_eq!(config.terminal_id, "0");
        assert_eq!(config.chunk_limit.get(), 512);
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "workbook",
            "--server",
            "https://lab.example.com",
            "run",
            "prog.py",
            "--terminal-id",
            "3",
            "--connect-timeout-secs",
            "5",
            "--log-level",
            "debug",
        ])
        .expect("parse");
        assert_eq!(cli.logging.level, LogLevel::Debug);
        let server = cli.server.clone();
        let config = run_args(cli).to_config(&server).expect("config");
        assert_eq!(
            config.endpoint().expect("endpoint").as_str(),
            "wss://lab.example.com/echo"
        );
        assert_eq!(config.terminal_id, "3");
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_chunk_limit_fails_config() {
        let cli = Cli::try_parse_from(["workbook", "run", "a.py", "--chunk-limit", "0"])
            .expect("parse");
        let server = cli.server.clone();
        assert!(run_args(cli).to_config(&server).is_err());
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["workbook", "run"]).is_err());
    }
}
