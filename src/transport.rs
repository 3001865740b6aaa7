//! The seam between the capture loop and the physical device. [`Transport`]
//! is the byte/line-level link; [`Connector`] knows how to open one. The
//! serial implementation lives here; simulated devices live in
//! [`crate::dummy_device`].

use serial2::SerialPort;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// A newline-delimited, bidirectional link to the sensor device.
pub trait Transport {
    /// Writes raw bytes to the device.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads one newline-terminated line, with the line ending and
    /// surrounding whitespace stripped. `Ok(None)` means the read timed
    /// out before a full line arrived, which is not an error.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Something that can open a fresh [`Transport`]. Each acquisition opens
/// its own link and drops it when done, so the device resets between
/// exercises the same way it did when the port was opened by hand.
pub trait Connector {
    /// The link type this connector produces.
    type Link: Transport;

    /// Opens a new link to the device.
    fn connect(&self) -> io::Result<Self::Link>;
}

/// Opens [`SerialLink`]s over a named serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    /// Port name, e.g. `COM4` or `/dev/ttyACM0`.
    pub port: String,
    /// Baud rate, 115200 for the stock firmware.
    pub baud: u32,
    /// Per-read timeout; bounds how long one loop iteration can block.
    pub read_timeout: Duration,
}

impl Connector for SerialConnector {
    type Link = SerialLink;

    fn connect(&self) -> io::Result<SerialLink> {
        let mut port = SerialPort::open(&self.port, self.baud)?;
        port.set_read_timeout(self.read_timeout)?;
        Ok(SerialLink {
            port,
            pending: Vec::new(),
            lines: VecDeque::new(),
        })
    }
}

/// A serial port plus the buffering needed to hand out whole lines. The
/// port closes when this is dropped, on every exit path.
pub struct SerialLink {
    port: SerialPort,
    pending: Vec<u8>,
    lines: VecDeque<String>,
}

impl Transport for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }

        let mut buffer = [0; 256];
        match self.port.read(&mut buffer) {
            Ok(0) => Ok(None),
            Ok(read_len) => {
                for &byte in buffer.iter().take(read_len) {
                    if byte == b'\n' {
                        // Garbage bytes are common right after the port
                        // opens, so decode lossily rather than failing.
                        let line = String::from_utf8_lossy(&self.pending)
                            .trim()
                            .to_string();
                        self.pending.clear();
                        self.lines.push_back(line);
                    } else {
                        self.pending.push(byte);
                    }
                }
                Ok(self.lines.pop_front())
            }
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
