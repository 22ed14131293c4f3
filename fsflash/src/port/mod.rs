//! Port abstraction for the serial link.
//!
//! The protocol layers never touch a concrete serial port. They talk to a
//! [`Port`], which is implemented for native platforms by [`NativePort`] on top
//! of the `serialport` crate and by in-memory mocks in tests.
//!
//! ```text
//! +---------------------+
//! |  FirmwareUploader   |
//! +----------+----------+
//!            |
//! +----------v----------+
//! |  ProtocolSession    |
//! +----------+----------+
//!            |
//! +----------v----------+
//! |     Transport       |
//! +----------+----------+
//!            |
//! +----------v----------+
//! |    Port (trait)     |
//! +----------+----------+
//!            |
//! +----------v----------+
//! | NativePort          |
//! |   (serialport)      |
//! +---------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::TransportError;

/// Baud rate of the boot loader link.
pub const DEFAULT_BAUD: u32 = 115200;

/// Per-read timeout of the boot loader link.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port configuration.
///
/// The link is always 8 data bits, no parity, one stop bit and no flow
/// control; only the name, speed and timeout vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a configuration for `port_name` with the default link settings.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

impl PortInfo {
    /// Whether the port sits on a USB bridge.
    pub fn is_usb(&self) -> bool {
        self.vid.is_some()
    }
}

/// Byte port used by the transport.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Get the current read timeout.
    fn timeout(&self) -> Duration;

    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> Result<usize, TransportError>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self);
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> crate::Result<Vec<PortInfo>>;

    /// Pick the port to use when the caller gave none: the only port, or the
    /// only USB port when several exist.
    fn auto_detect() -> crate::Result<PortInfo> {
        let ports = Self::list_ports()?;
        if ports.len() == 1 {
            return ports
                .into_iter()
                .next()
                .ok_or(crate::Error::DeviceNotFound);
        }

        let mut usb = ports.into_iter().filter(PortInfo::is_usb);
        match (usb.next(), usb.next()) {
            (Some(port), None) => Ok(port),
            _ => Err(crate::Error::DeviceNotFound),
        }
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0")
            .with_timeout(Duration::from_millis(250));

        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    struct FixedPorts;

    impl PortEnumerator for FixedPorts {
        fn list_ports() -> crate::Result<Vec<PortInfo>> {
            Ok(vec![
                PortInfo {
                    name: "/dev/ttyS0".into(),
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                },
                PortInfo {
                    name: "/dev/ttyUSB0".into(),
                    vid: Some(0x10C4),
                    pid: Some(0xEA60),
                    manufacturer: None,
                    product: Some("CP2102".into()),
                },
            ])
        }
    }

    #[test]
    fn test_auto_detect_prefers_single_usb_port() {
        let port = FixedPorts::auto_detect().unwrap();
        assert_eq!(port.name, "/dev/ttyUSB0");
    }
}
