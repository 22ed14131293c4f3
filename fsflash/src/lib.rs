//! # fsflash
//!
//! A library for flashing FlySky transmitters over their serial boot loader.
//!
//! The boot loader speaks a small half-duplex protocol of checksummed frames:
//!
//! - Frame codec and 16-bit subtractive checksum
//! - Byte transport with exact reads, timeouts and input draining
//! - Ping, write-permission, chunk write and restart exchanges
//! - Block-wise firmware upload with bounded per-block retries
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use fsflash::{FirmwareImage, Flasher, TransportConfig, UploadConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("firmware.bin")?;
//!     println!("Flashing {}", image.info().label());
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = Flasher::open(
//!             "/dev/ttyUSB0",
//!             TransportConfig::default(),
//!             UploadConfig::default(),
//!         )?;
//!         flasher.flash(&image, |done, total| {
//!             println!("{done}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod testing;

// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, ProtocolError, Result, TransportError, UploadError},
    flasher::Flasher,
    image::{FirmwareImage, FirmwareInfo},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    session::ProtocolSession,
    transport::{Transport, TransportConfig},
    upload::{FirmwareUploader, UploadConfig, UploadReport, plan_blocks},
};
