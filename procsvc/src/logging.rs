use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{ProcsvcError, ProcsvcResult};

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// Hourly-rotated log files go here when set.
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::WARN,
            logging_enabled: true,
            logger_name: "procsvc".to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Installs the process-wide subscriber. Service controls arrive on
    /// threads of their own, so a thread-local default would miss them.
    pub fn load_logger(&self) -> ProcsvcResult<()> {
        if !self.logging_enabled {
            return Ok(());
        }

        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();

        // stdout carries command results
        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stderr);

        let file_layer = match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| ProcsvcError::file_system("create log directory", dir, e))?;
                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(dir)
                    .map_err(|e| ProcsvcError::Internal(format!("log file appender: {e}")))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_writer(file_appender),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer)
            .try_init()
            .map_err(|e| ProcsvcError::Internal(format!("installing {} logger: {e}", self.logger_name)))?;

        crate::debug!("Started {} logger at {}", self.logger_name, self.level);
        Ok(())
    }
}

#[allow(dead_code)]
pub trait LoggingConfigTrait {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig;

    fn logging_enabled(mut self, enabled: bool) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logging_enabled = enabled;
        self
    }

    fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logger_name = logger_name.into();
        self
    }

    /// Sets the log level to TRACE: command evaluation and snapshots.
    fn log_level_trace(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::TRACE;
        self
    }

    /// Sets the log level to DEBUG.
    ///
    /// Per-process kill decisions, handle closes and control commands.
    fn log_level_debug(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::DEBUG;
        self
    }

    /// Sets the log level to INFO.
    ///
    /// Lifecycle events: launches, kills, service start, controls, teardown.
    fn log_level_info(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::INFO;
        self
    }

    /// Sets the log level to WARN.
    fn log_level_warn(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::WARN;
        self
    }

    /// Sets the log level to ERROR.
    fn log_level_error(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::ERROR;
        self
    }
}

impl LoggingConfigTrait for LoggingConfig {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_setters() {
        let config = LoggingConfig::new()
            .log_level_debug()
            .logger_name("svc")
            .logging_enabled(false)
            .log_dir("/tmp/procsvc-logs");
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert_eq!(config.logger_name, "svc");
        assert!(!config.logging_enabled);
        assert_eq!(config.log_dir.as_deref(), Some(std::path::Path::new("/tmp/procsvc-logs")));
    }

    #[test]
    fn disabled_logger_installs_nothing() {
        LoggingConfig::new().logging_enabled(false).load_logger().unwrap();
    }
}
