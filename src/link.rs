//! Line-delimited serial link to the host
//!
//! Inbound lines are JSON commands, outbound lines are JSON records. Reading
//! never blocks: [`Link::poll_line`] only consumes bytes the transport already
//! has buffered and returns `None` until a full line arrived.

use alloc::string::String;
use embedded_io::{Read, ReadReady, Write};
use heapless::Vec;

use crate::config::LINE_CAPACITY;
use crate::error::LinkError;

/// Bidirectional line channel to the host.
pub trait Link {
    /// Whether a host is attached. Links without that notion are always up.
    fn is_connected(&mut self) -> bool {
        true
    }

    /// Next complete inbound line without its terminator, if one is buffered.
    fn poll_line(&mut self) -> Result<Option<String>, LinkError>;

    /// Send one line; the terminator is appended.
    fn send_line(&mut self, line: &str) -> Result<(), LinkError>;
}

impl<L: Link + ?Sized> Link for &mut L {
    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        (**self).poll_line()
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        (**self).send_line(line)
    }
}

/// [`Link`] over any `embedded-io` byte stream, such as a UART or USB CDC port.
pub struct SerialLink<S> {
    port: S,
    line: Vec<u8, LINE_CAPACITY>,
    /// Dropping the rest of an overlong line
    discarding: bool,
    connected: bool,
}

impl<S: Read + ReadReady + Write> SerialLink<S> {
    pub fn new(port: S) -> Self {
        Self {
            port,
            line: Vec::new(),
            discarding: false,
            connected: true,
        }
    }

    /// Report host presence, e.g. from the USB DTR line.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    fn take_line(&mut self) -> Result<Option<String>, LinkError> {
        let line = core::str::from_utf8(&self.line)
            .map(|s| String::from(s.trim_end_matches('\r')))
            .map_err(|_| LinkError::Malformed);
        self.line.clear();
        line.map(Some)
    }
}

impl<S: Read + ReadReady + Write> Link for SerialLink<S> {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        let mut byte = [0u8; 1];
        while self.port.read_ready().map_err(|_| LinkError::Read)? {
            if self.port.read(&mut byte).map_err(|_| LinkError::Read)? == 0 {
                break;
            }
            match byte[0] {
                b'\n' if self.discarding => self.discarding = false,
                b'\n' if self.line.is_empty() => {}
                b'\n' => return self.take_line(),
                _ if self.discarding => {}
                b => {
                    if self.line.push(b).is_err() {
                        self.line.clear();
                        self.discarding = true;
                        return Err(LinkError::LineTooLong(LINE_CAPACITY));
                    }
                }
            }
        }
        Ok(None)
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.port
            .write_all(line.as_bytes())
            .and_then(|()| self.port.write_all(b"\n"))
            .and_then(|()| self.port.flush())
            .map_err(|_| LinkError::Write)
    }
}
