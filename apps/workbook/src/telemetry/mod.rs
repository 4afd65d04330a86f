pub mod logging {
    //! Process-wide `tracing` subscriber.
    //!
    //! Records go to `--log-file` when one is given, otherwise to stderr.
    //! A run holds the terminal in raw mode, where a bare line feed does not
    //! return the cursor, so stderr output on a terminal is written with
    //! CRLF line endings.

    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::io::{self, IsTerminal, Write};
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
    use tracing_subscriber::EnvFilter;

    const FILTER_ENV: &str = "WORKBOOK_LOG_FILTER";
    const SOCKET_TRACE_ENV: &str = "WORKBOOK_TRACE_DEPS";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        /// `EnvFilter` directives for this level. Below `info` only the
        /// client's own crates get the extra detail; `socket_traces` lifts
        /// the websocket stack to `trace` as well.
        fn directives(self, socket_traces: bool) -> String {
            match self {
                LogLevel::Error => "error".into(),
                LogLevel::Warn => "warn".into(),
                LogLevel::Info => "info".into(),
                LogLevel::Debug => "info,workbook_client_core=debug,workbook=debug".into(),
                LogLevel::Trace if socket_traces => "trace".into(),
                LogLevel::Trace => "info,workbook_client_core=trace,workbook=trace".into(),
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Installs the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let filter = match std::env::var(FILTER_ENV) {
            Ok(directives) => EnvFilter::new(directives),
            Err(_) => EnvFilter::new(config.level.directives(env_flag(SOCKET_TRACE_ENV))),
        };
        let to_terminal = config.file.is_none() && io::stderr().is_terminal();
        let (writer, guard) = open_writer(config, to_terminal)?;

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(to_terminal)
            .with_writer(writer)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(guard);
        Ok(())
    }

    fn open_writer(
        config: &LogConfig,
        to_terminal: bool,
    ) -> Result<(NonBlocking, WorkerGuard), InitError> {
        match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok(tracing_appender::non_blocking(file))
            }
            None if to_terminal => Ok(tracing_appender::non_blocking(CrlfWriter(io::stderr()))),
            None => Ok(tracing_appender::non_blocking(io::stderr())),
        }
    }

    fn env_flag(var: &str) -> bool {
        std::env::var(var).is_ok_and(|v| !v.is_empty() && v != "0")
    }

    /// Rewrites each `\n` as `\r\n`.
    struct CrlfWriter<W>(W);

    impl<W: Write> Write for CrlfWriter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut lines = buf.split(|byte| *byte == b'\n');
            if let Some(first) = lines.next() {
                self.0.write_all(first)?;
            }
            for line in lines {
                self.0.write_all(b"\r\n")?;
                self.0.write_all(line)?;
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

}
