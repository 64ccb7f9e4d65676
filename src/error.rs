use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Error connecting to port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("Error reading from serial: {0}")]
    Read(#[source] std::io::Error),

    #[error("Error writing to serial: {0}")]
    Write(#[source] std::io::Error),

    #[error("Serial connection is not open.")]
    NotConnected,

    #[error("Line exceeded {limit} bytes, discarded")]
    LineTooLong { limit: usize },
}

pub type Result<T> = std::result::Result<T, LinkError>;
