use std::io::{ErrorKind, Read, Write};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};


use crate::error::{LinkError, Result};
use crate::fanout::{Callback, Fanout, LinkEvent, SubscriberId, Subscription};
use crate::parser::{Assembled, LineBuffer, LineParser, ParseOutcome};
use crate::settings::SerialSettings;

const READ_CHUNK: usize = 256;

/// Owns the serial device and the background reader feeding the fan-out.
///
/// Callbacks run on the reader thread while the fan-out is locked, so a
/// callback must not call back into the link.
pub struct TelemetryLink {
    settings: SerialSettings,
    fanout: Arc<Mutex<Fanout>>,
    session: Option<Session>,
}

struct Session {
    port_name: String,
    writer: Box<dyn Write + Send>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryLink {
    pub fn new(settings: SerialSettings) -> Self {
        TelemetryLink {
            settings,
            fanout: Arc::new(Mutex::new(Fanout::default())),
            session: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Takes effect on the next `connect`.
    pub fn set_settings(&mut self, settings: SerialSettings) {
        self.settings = settings;
    }

    pub fn detect_ports() -> Vec<String> {
        crate::serial_port_list()
    }

    pub fn connect(&mut self, port: &str) -> Result<()> {
        if self.session.is_some() {
            self.disconnect();
        }

        let serial = match self.settings.builder(port).open() {
            Ok(serial) => serial,
            Err(source) => return Err(self.report_open_failure(port, source)),
        };
        let reader = match serial.try_clone() {
            Ok(reader) => reader,
            Err(source) => return Err(self.report_open_failure(port, source)),
        };

        log::info!("Connected to {port} at {} baud", self.settings.baud_rate);
        publish(&self.fanout, LinkEvent::Status(format!("Connected to {port}")));

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let running = running.clone();
            let fanout = self.fanout.clone();
            let max_line_len = self.settings.max_line_len;
            thread::spawn(move || {
                read_loop(reader, &running, &fanout, &LineParser::new(), max_line_len);
            })
        };

        self.session = Some(Session {
            port_name: port.to_string(),
            writer: Box::new(serial),
            running,
            handle: Some(handle),
        });

        Ok(())
    }

    /// Connect to the first enumerated port. `Ok(None)` when there is none.
    pub fn connect_first_available(&mut self) -> Result<Option<String>> {
        let Some(port) = Self::detect_ports().into_iter().next() else {
            log::warn!("No serial ports available");
            return Ok(None);
        };
        self.connect(&port)?;
        Ok(Some(port))
    }

    pub fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.running.store(false, Ordering::SeqCst);
        if let Some(handle) = session.handle.take()
            && handle.join().is_err()
        {
            log::error!("Serial reader thread for {} panicked", session.port_name);
        }

        log::info!("Disconnected from {}", session.port_name);
        publish(&self.fanout, LinkEvent::Status("Disconnected.".to_string()));
    }

    /// Close a session whose reader already stopped on its own, releasing
    /// the port. Returns true if a session was closed.
    pub fn release_if_stopped(&mut self) -> bool {
        let stopped = self
            .session
            .as_ref()
            .is_some_and(|s| !s.running.load(Ordering::SeqCst));
        if stopped {
            self.disconnect();
        }
        stopped
    }

    pub fn stop(&mut self) {
        self.disconnect();
    }

    /// False once the reader has stopped on its own (read error, end of
    /// stream) even if `disconnect` was not called yet.
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::SeqCst))
    }

    pub fn port_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.port_name.as_str())
    }

    pub fn write(&mut self, data: &str) -> Result<()> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.running.load(Ordering::SeqCst))
        else {
            return Err(LinkError::NotConnected);
        };

        let payload = format!("{data}{}", self.settings.line_ending);
        if let Err(e) = session.writer.write_all(payload.as_bytes()) {
            let err = LinkError::Write(e);
            log::error!("{err}");
            publish(&self.fanout, LinkEvent::Error(err.to_string()));
            return Err(err);
        }

        log::debug!("Sent {data:?} to {}", session.port_name);
        publish(&self.fanout, LinkEvent::Status(format!("Sent: {data}")));
        Ok(())
    }

    pub fn register_callback(&self, callback: Callback) -> SubscriberId {
        lock(&self.fanout).register(callback)
    }

    pub fn unregister_callback(&self, id: SubscriberId) -> bool {
        lock(&self.fanout).unregister(id)
    }

    pub fn subscribe(&self) -> Subscription {
        lock(&self.fanout).subscribe()
    }

    /// Shared handle to the fan-out, for wiring consumers such as the
    /// CSV recorder.
    pub fn fanout(&self) -> Arc<Mutex<Fanout>> {
        self.fanout.clone()
    }

    fn report_open_failure(&self, port: &str, source: serialport::Error) -> LinkError {
        let err = LinkError::PortOpen {
            port: port.to_string(),
            source,
        };
        log::error!("{err}");
        publish(&self.fanout, LinkEvent::Error(err.to_string()));
        err
    }
}

impl Drop for TelemetryLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock(fanout: &Mutex<Fanout>) -> std::sync::MutexGuard<'_, Fanout> {
    fanout.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(fanout: &Mutex<Fanout>, event: LinkEvent) {
    lock(fanout).publish(event);
}

/// Body of the background reader.
///
/// Reads until `running` clears, the stream ends, or a read fails with
/// anything other than a timeout. Clears `running` on exit.
pub fn read_loop<R: Read>(
    mut reader: R,
    running: &AtomicBool,
    fanout: &Mutex<Fanout>,
    parser: &LineParser,
    max_line_len: usize,
) {
    let _stopped = ClearOnExit(running);
    let mut lines = LineBuffer::new(max_line_len);
    let mut chunk = [0u8; READ_CHUNK];

    while running.load(Ordering::SeqCst) {
        match reader.read(&mut chunk) {
            Ok(0) => {
                log::info!("Serial stream closed");
                publish(fanout, LinkEvent::Status("Serial stream closed.".to_string()));
                break;
            }
            Ok(n) => {
                for assembled in lines.push(&chunk[..n]) {
                    handle_assembled(assembled, fanout, parser, max_line_len);
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                let err = LinkError::Read(e);
                log::error!("{err}");
                publish(fanout, LinkEvent::Error(err.to_string()));
                break;
            }
        }
    }
}

/// Clears the running flag when the reader exits, including by unwinding
/// out of a panicking callback.
struct ClearOnExit<'a>(&'a AtomicBool);

impl Drop for ClearOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn handle_assembled(
    assembled: Assembled,
    fanout: &Mutex<Fanout>,
    parser: &LineParser,
    max_line_len: usize,
) {
    let line = match assembled {
        Assembled::Line(line) => line,
        Assembled::Overflow { discarded } => {
            log::warn!("Discarded {discarded} bytes without a line terminator");
            let err = LinkError::LineTooLong {
                limit: max_line_len,
            };
            publish(fanout, LinkEvent::Error(err.to_string()));
            return;
        }
    };

    if line.trim().is_empty() {
        return;
    }

    log::debug!("Received: {line}");
    let mut fanout = lock(fanout);
    fanout.publish(LinkEvent::Raw(line.clone()));

    match parser.parse(&line) {
        ParseOutcome::Empty => {}
        ParseOutcome::Frame { frame, skipped } => {
            if skipped > 0 {
                log::debug!("Skipped {skipped} unrecognised tokens");
            }
            fanout.publish(LinkEvent::Frame(frame));
        }
        ParseOutcome::Unmatched { line } => fanout.publish(LinkEvent::Unmatched(line)),
    }
}
