use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::RecvTimeoutError,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::fanout::{LinkEvent, Subscription};
use crate::field::Field;
use crate::parser::TelemetryFrame;

const POLL: Duration = Duration::from_millis(100);

/// Writes every telemetry frame to a timestamped CSV file on its own thread.
pub struct Recorder {
    path: PathBuf,
    flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Recorder {
    pub fn start(dir: &Path, mut rx: Subscription) -> Result<Self> {
        let filename = format!(
            "{}_telemetry.csv",
            chrono::Local::now().format("%Y-%m-%d-%H-%M-%S")
        );
        let path = dir.join(filename);

        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut csv = BufWriter::new(file);
        write_header(&mut csv)?;
        csv.flush()?;
        log::info!("Recording telemetry to {}", path.display());

        let flag = Arc::new(AtomicBool::new(false));
        let stop = flag.clone();

        let handle = thread::spawn(move || -> Result<()> {
            while !stop.load(Ordering::SeqCst) {
                match rx.recv_timeout(POLL) {
                    Ok(LinkEvent::Frame(frame)) => {
                        write_row(&mut csv, &frame)?;
                        csv.flush()?;
                    }
                    Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        });

        Ok(Recorder {
            path,
            flag,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("Recorder thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Recorder for {} failed: {e}", self.path.display());
        }
    }
}

pub fn write_header<W: Write>(csv: &mut W) -> Result<()> {
    let columns = Field::all()
        .iter()
        .map(|f| f.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",");
    writeln!(csv, "Timestamp,{columns}")?;
    Ok(())
}

/// One row per frame; fields missing from the frame leave an empty cell.
pub fn write_row<W: Write>(csv: &mut W, frame: &TelemetryFrame) -> Result<()> {
    writeln!(
        csv,
        "{},{}",
        frame.time.format("%Y-%m-%d %H:%M:%S%.3f"),
        Field::all()
            .iter()
            .map(|f| frame.get(*f).map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",")
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::Fanout;
    use crate::parser::{LineParser, ParseOutcome};

    fn parsed(line: &str) -> TelemetryFrame {
        match LineParser::new().parse(line) {
            ParseOutcome::Frame { frame, .. } => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn header_lists_canonical_fields() {
        let mut out = Vec::new();
        write_header(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Timestamp,Vref,Vout,Avg Altitude,Avg Velocity,AirBreakSTS,RecSTS,BatSTS\n"
        );
    }

    #[test]
    fn row_leaves_missing_fields_empty() {
        let frame = parsed("Vref: 3.30, Average Altitude: 792.95 m");
        let mut out = Vec::new();
        write_row(&mut out, &frame).unwrap();

        let row = String::from_utf8(out).unwrap();
        let cells: Vec<&str> = row.trim_end().split(',').collect();
        assert_eq!(cells.len(), 8);
        assert_eq!(&cells[1..], ["3.3", "", "792.95", "", "", "", ""]);
    }

    #[test]
    fn records_published_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut fanout = Fanout::new(16);
        let recorder = Recorder::start(dir.path(), fanout.subscribe()).unwrap();
        let path = recorder.path().to_path_buf();

        fanout.publish(LinkEvent::Status("Connected to test".to_string()));
        fanout.publish(LinkEvent::Frame(parsed("Vout: 1.06")));
        fanout.publish(LinkEvent::Frame(parsed("Vout: 1.07")));

        // Give the recorder thread time to drain the channel before stopping.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let rows = std::fs::read_to_string(&path).unwrap().lines().count();
            if rows == 3 || std::time::Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        recorder.stop().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",1.06,"));
        assert!(lines[2].contains(",1.07,"));
    }
}
