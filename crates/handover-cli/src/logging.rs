use crate::config::Settings;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "HANDOVER_LOG_LEVEL";
pub const LOG_FILE_NAME: &str = "handover.log";

pub struct LogGuard {
    file: Option<Arc<Mutex<fs::File>>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.lock().unwrap_or_else(PoisonError::into_inner).flush();
        }
    }
}

/// Installs the global subscriber. Logs go to stderr, plus the log file when
/// a log directory is configured. Operator output stays on stdout.
pub fn init_logging(settings: &Settings) -> Option<LogGuard> {
    let level = filter_level(settings.debug, std::env::var(LOG_LEVEL_ENV).ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let guard = match settings.log_dir.as_deref().map(open_log_file).transpose() {
        Ok(file) => LogGuard { file },
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn filter_level(debug: bool, env_level: Option<String>) -> String {
    if debug {
        "debug".to_string()
    } else if let Some(level) = env_level.filter(|level| !level.trim().is_empty()) {
        level
    } else {
        "warn".to_string()
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<Arc<Mutex<fs::File>>> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;
    Ok(Arc::new(Mutex::new(file)))
}

struct MultiWriter {
    stderr: io::Stderr,
    file: Option<Arc<Mutex<fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<fs::File>>>) -> Self {
        Self {
            stderr: io::stderr(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stderr.write_all(buf);
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stderr.flush();
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.flush();
        }
        Ok(())
    }
}
