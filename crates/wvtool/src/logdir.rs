//! Per-section log files
//!
//! With `--logdir DIR` every section of every stream is also written, in
//! full and without colors, to a file of its own named
//! `NNNN-<source>-<section>.log`. Section numbers run across all streams of
//! one invocation, in the order the sections started.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;
use wvtest::aggregate::PREAMBLE_SOURCE;
use wvtest::{ClassifiedEvent, Emitted};

use crate::report::Renderer;

/// Directory receiving section logs
#[derive(Debug, Clone)]
pub struct LogDir {
    path: PathBuf,
    sections: Arc<AtomicUsize>,
}

impl LogDir {
    /// Use `path`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            sections: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A logger for one stream; `label` names its implicit preamble section
    #[must_use]
    pub fn logger(&self, label: impl Into<String>) -> SectionLogger {
        SectionLogger {
            dir: self.clone(),
            label: label.into(),
            current: None,
        }
    }

    fn open(&self, source: &str, section: &str) -> io::Result<Renderer<BufWriter<File>>> {
        let number = self.sections.fetch_add(1, Ordering::Relaxed) + 1;
        let path = self.path.join(log_file_name(number, source, section));
        debug!(path = %path.display(), "opening section log");
        Ok(Renderer::plain(BufWriter::new(File::create(path)?)))
    }
}

/// File name of the `number`th section log
///
/// Spaces and slashes become underscores and the section name is lowercased.
#[must_use]
pub fn log_file_name(number: usize, source: &str, section: &str) -> String {
    let clean = |s: &str| s.replace([' ', '/'], "_");
    format!(
        "{number:04}-{}-{}.log",
        clean(source),
        clean(&section.to_lowercase())
    )
}

/// Splits one stream into section logs
#[derive(Debug)]
pub struct SectionLogger {
    dir: LogDir,
    label: String,
    current: Option<Renderer<BufWriter<File>>>,
}

impl SectionLogger {
    /// Write one line to the log of its section, starting a new log at
    /// every banner
    ///
    /// # Errors
    ///
    /// Returns an IO error if a log cannot be created or written.
    pub fn observe(&mut self, event: &ClassifiedEvent) -> io::Result<()> {
        match event {
            ClassifiedEvent::Banner {
                section, source, ..
            } => self.start(source, section)?,
            ClassifiedEvent::Plain { text } if text.is_empty() && self.current.is_none() => {
                return Ok(());
            }
            _ if self.current.is_none() => {
                let section = format!("Preamble of {}", self.label);
                self.start(PREAMBLE_SOURCE, &section)?;
                let banner = Emitted::Banner {
                    prefix: String::new(),
                    section,
                    source: PREAMBLE_SOURCE.to_string(),
                };
                self.write(&banner)?;
            }
            _ => {}
        }
        self.write(&Emitted::from(event.clone()))
    }

    /// Flush the last log
    ///
    /// # Errors
    ///
    /// Returns an IO error if flushing fails.
    pub fn finish(mut self) -> io::Result<()> {
        self.close()
    }

    fn start(&mut self, source: &str, section: &str) -> io::Result<()> {
        self.close()?;
        self.current = Some(self.dir.open(source, section)?);
        Ok(())
    }

    fn write(&mut self, item: &Emitted) -> io::Result<()> {
        match self.current.as_mut() {
            Some(log) => log.render(None, item),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.current.take() {
            Some(log) => log.into_inner().flush(),
            None => Ok(()),
        }
    }
}
