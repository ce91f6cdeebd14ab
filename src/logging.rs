//! Tracing setup helpers for hosts embedding the notifier.

use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE_PREFIX: &str = "slack_notify";

/// Rolling file output for notifier logs.
pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Create the non-blocking writer and its flush guard. The guard must
    /// be held for as long as file logging should stay active.
    pub fn setup_file_logging(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender = RollingFileAppender::new(
            self.rotation.to_owned(),
            &self.log_directory,
            LOG_FILE_PREFIX,
        );

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Console-only logging with RUST_LOG filtering.
pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Console plus rolling-file logging. Returns the file writer's flush
/// guard.
pub fn setup_logging_with_file(file_logger: &FileLogger) -> io::Result<WorkerGuard> {
    let (file_writer, guard) = file_logger.setup_file_logging()?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
