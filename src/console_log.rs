use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only text log of everything shown in the serial console.
#[derive(Default)]
pub struct ConsoleLog {
    file: Option<(PathBuf, File)>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, path: &Path) -> Result<()> {
        let file = open_append(path)?;
        log::info!("Console logging to {}", path.display());
        self.file = Some((path.to_path_buf(), file));
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some((path, _)) = self.file.take() {
            log::info!("Console logging to {} stopped", path.display());
        }
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(p, _)| p.as_path())
    }

    /// No-op while logging is off.
    pub fn append(&mut self, message: &str) -> Result<()> {
        if let Some((path, file)) = self.file.as_mut() {
            writeln!(file, "{message}")
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    /// Close and reopen the file, flushing everything written so far.
    pub fn reopen(&mut self) -> Result<()> {
        if let Some((path, _)) = self.file.take() {
            let file = open_append(&path)?;
            self.file = Some((path, file));
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_only_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial_log.txt");
        let mut log = ConsoleLog::new();

        log.append("before start").unwrap();
        assert!(!path.exists());

        log.start(&path).unwrap();
        assert!(log.is_active());
        log.append("Connected to /dev/ttyUSB0").unwrap();
        log.reopen().unwrap();
        log.append("Vref: 3.30").unwrap();
        log.stop();
        log.append("after stop").unwrap();

        assert!(!log.is_active());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Connected to /dev/ttyUSB0\nVref: 3.30\n"
        );
    }

    #[test]
    fn restarting_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial_log.txt");
        std::fs::write(&path, "old\n").unwrap();

        let mut log = ConsoleLog::new();
        log.start(&path).unwrap();
        log.append("new").unwrap();
        log.stop();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }
}
