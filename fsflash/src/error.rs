//! Error types for fsflash.
//!
//! Errors are layered the same way the protocol is: [`TransportError`] for the
//! byte channel, [`ProtocolError`] for frames and command exchanges, and
//! [`UploadError`] for the retry policy of a full upload. [`Error`] wraps all of
//! them for callers that only want one type.

use std::io;
use thiserror::Error;

/// Result type for fsflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Byte-channel failure. Always fatal to the current exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The read timeout elapsed before the requested bytes arrived.
    #[error("Read timeout: expected {expected} bytes, received {received}")]
    Timeout {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes received before the timeout.
        received: usize,
    },

    /// The port accepted fewer bytes than were written.
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// Number of bytes the port accepted.
        written: usize,
        /// Number of bytes in the request.
        expected: usize,
    },

    /// I/O error on the underlying port.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Corrupted, malformed or out-of-sync exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport failed while exchanging a frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A device frame did not start with the `0x55` marker.
    #[error("Bad frame marker: 0x{0:02X}")]
    BadMarker(u8),

    /// A device frame declared a size too small to hold its checksum.
    #[error("Invalid frame size: {0}")]
    InvalidLength(u16),

    /// The frame checksum did not match its contents.
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        expected: u16,
        /// Checksum carried in the frame trailer.
        actual: u16,
    },

    /// The device answered with something other than the expected body.
    #[error("Unexpected response to 0x{command:02X}: expected {expected:02X?}, got {actual:02X?}")]
    UnexpectedResponse {
        /// Opcode of the request.
        command: u8,
        /// Expected response payload (or expected prefix).
        expected: Vec<u8>,
        /// Payload actually received.
        actual: Vec<u8>,
    },

    /// A payload too large for the 16-bit length field.
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Failure of a firmware upload as a whole.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A block failed on every allowed attempt.
    #[error("Block at 0x{address:04X} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Flash address of the failing block.
        address: u16,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        #[source]
        source: ProtocolError,
    },
}

/// Error type for fsflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transport failure outside a protocol exchange.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Upload aborted.
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Firmware image rejected by the loader.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// No serial port found.
    #[error("Device not found")]
    DeviceNotFound,
}
