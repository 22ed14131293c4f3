//! Single-shot flashing run.
//!
//! A [`Flasher`] owns one open port for the lifetime of one run: ping the boot
//! loader, upload the image, restart the device. The port is released when the
//! run ends, whichever way it ends.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fsflash::{FirmwareImage, Flasher, TransportConfig, UploadConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("firmware.bin")?;
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

use {
    crate::{
        error::Result,
        image::FirmwareImage,
        port::Port,
        session::ProtocolSession,
        transport::{Transport, TransportConfig},
        upload::{FirmwareUploader, UploadConfig, UploadReport},
    },
    log::{error, info},
};

/// Flasher for one device over one port.
///
/// Generic over the port type `P`, so tests can run it against an in-memory
/// device.
pub struct Flasher<P: Port> {
    session: ProtocolSession<P>,
    upload_config: UploadConfig,
}

impl<P: Port> Flasher<P> {
    /// Create a flasher over an opened port.
    pub fn new(port: P, transport_config: TransportConfig, upload_config: UploadConfig) -> Self {
        Self {
            session: ProtocolSession::new(Transport::new(port, transport_config)),
            upload_config,
        }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        self.session
            .transport()
            .port()
    }

    /// Get a mutable reference to the protocol session.
    pub fn session_mut(&mut self) -> &mut ProtocolSession<P> {
        &mut self.session
    }

    /// Check that the boot loader answers.
    pub fn connect(&mut self) -> Result<()> {
        info!(
            "Connecting to boot loader on {}...",
            self.port().name()
        );
        self.session.ping()?;
        info!("Boot loader found");
        Ok(())
    }

    /// Upload `image`, reporting progress as `(bytes_done, bytes_total)`.
    pub fn upload<F>(&mut self, image: &FirmwareImage, progress: F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        let report = FirmwareUploader::new(&mut self.session, self.upload_config).upload(image, progress)?;
        Ok(report)
    }

    /// Restart the device into the new firmware.
    pub fn restart(&mut self) -> Result<()> {
        info!("Restarting device...");
        self.session.restart()?;
        Ok(())
    }

    /// Run ping, upload and restart, then release the port.
    ///
    /// Nothing is written after the first fatal error.
    pub fn flash<F>(&mut self, image: &FirmwareImage, progress: F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        let result = self.run(image, progress);
        if let Err(e) = &result {
            error!("Flashing failed: {e}");
        }
        self.close();
        result
    }

    fn run<F>(&mut self, image: &FirmwareImage, progress: F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        self.connect()?;
        let report = self.upload(image, progress)?;
        self.restart()?;
        Ok(report)
    }

    /// Release the port. Further exchanges fail.
    pub fn close(&mut self) {
        self.session
            .transport_mut()
            .close();
    }
}

impl<P: Port> Drop for Flasher<P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "native")]
mod native_impl {
    use super::{Flasher, Result, TransportConfig, UploadConfig};
    use crate::port::{NativePort, SerialConfig};

    impl Flasher<NativePort> {
        /// Open `port_name` at 115200 8N1 and create a flasher over it.
        pub fn open(
            port_name: &str,
            transport_config: TransportConfig,
            upload_config: UploadConfig,
        ) -> Result<Self> {
            let config = SerialConfig::new(port_name).with_timeout(transport_config.read_timeout);
            let port = NativePort::open(&config)?;
            Ok(Self::new(port, transport_config, upload_config))
        }
    }
}
