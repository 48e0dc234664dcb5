use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

/// Keeps the log file alive for the whole session.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl LogGuard {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// The terminal belongs to the UI, so events only go to the file. Without a
/// file they are discarded.
struct FileWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.flush();
        }
        Ok(())
    }
}

pub fn init_logging(log_dir: &str, level: &str) -> LogGuard {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let guard = match open_log_file(log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard {
                file: None,
                path: None,
            }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || FileWriter { file: file.clone() });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    guard
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard {
            file: None,
            path: None,
        });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("taskdeck-{}.log", std::process::id()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
        path: Some(path),
    })
}
