pub mod console_log;
pub mod error;
pub mod fanout;
pub mod field;
pub mod link;
pub mod parser;
pub mod recorder;
pub mod settings;
pub mod snapshot;
pub mod timers;

pub use error::LinkError;
pub use fanout::{LinkEvent, SubscriberId, Subscription};
pub use field::Field;
pub use link::TelemetryLink;
pub use parser::{LineParser, ParseOutcome, TelemetryFrame};

pub fn serial_port_list() -> Vec<String> {
    try_serial_port_list().unwrap_or_else(|e| {
        log::warn!("{e}");
        Vec::new()
    })
}

pub fn try_serial_port_list() -> error::Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
