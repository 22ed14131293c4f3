//! Firmware image loading.
//!
//! Vendor firmware files come in two layouts: the bare application image, or
//! the same image preceded by a `0x1800`-byte boot loader header. A file longer
//! than [`MAX_IMAGE_SIZE`] is taken to carry the header, which is stripped.
//!
//! ```text
//! with header:     +----------------+-----------------------------+
//!                  | header 0x1800  |     application image       |
//!                  +----------------+-----------------------------+
//! without header:                   |     application image       |
//!                                   +-----------------------------+
//!                                   ^ flashed at BASE_ADDRESS
//! ```
//!
//! The application image carries two 16-byte ASCII fields, the firmware name
//! and its build date, at fixed offsets used for display only.

use {
    crate::error::{Error, Result},
    log::debug,
    std::path::Path,
};

/// Flash address the image is written to.
pub const BASE_ADDRESS: u16 = 0x1800;

/// Length of the optional boot loader header.
pub const HEADER_LEN: usize = 0x1800;

/// Smallest accepted image (after header stripping).
pub const MIN_IMAGE_SIZE: usize = 0x9000;

/// Largest accepted image (after header stripping).
pub const MAX_IMAGE_SIZE: usize = 0xE7FF;

/// Offset of the firmware name in a header-less file.
pub const NAME_OFFSET: usize = 0xD6AD;

/// Offset of the build date in a header-less file.
pub const DATE_OFFSET: usize = 0xD6C0;

/// Length of the name and date fields.
pub const FIELD_LEN: usize = 16;

/// Descriptive data about a loaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FirmwareInfo {
    /// Firmware name, if present.
    pub name: Option<String>,
    /// Build date, if present.
    pub build_date: Option<String>,
    /// Size of the file as read.
    pub raw_size: usize,
    /// Size of the image that will be flashed.
    pub image_size: usize,
    /// Whether a boot loader header was stripped.
    pub header_stripped: bool,
}

impl FirmwareInfo {
    /// Name and date joined for display.
    pub fn label(&self) -> String {
        match (&self.name, &self.build_date) {
            (Some(name), Some(date)) => format!("{name} {date}"),
            (Some(name), None) => name.clone(),
            (None, Some(date)) => date.clone(),
            (None, None) => "unknown firmware".to_string(),
        }
    }
}

/// A validated firmware image ready to flash.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    info: FirmwareInfo,
}

impl FirmwareImage {
    /// Validate a raw firmware file and strip its header if present.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let header_stripped = raw.len() > MAX_IMAGE_SIZE;
        let data = if header_stripped {
            &raw[HEADER_LEN..]
        } else {
            raw
        };

        if !(MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE).contains(&data.len()) {
            return Err(Error::InvalidImage(format!(
                "unexpected firmware size: {} bytes (expected 0x{MIN_IMAGE_SIZE:X}..=0x{MAX_IMAGE_SIZE:X})",
                data.len()
            )));
        }

        let shift = if header_stripped { HEADER_LEN } else { 0 };
        let info = FirmwareInfo {
            name: ascii_field(raw, NAME_OFFSET + shift),
            build_date: ascii_field(raw, DATE_OFFSET + shift),
            raw_size: raw.len(),
            image_size: data.len(),
            header_stripped,
        };

        debug!(
            "Loaded firmware: {} bytes raw, {} bytes image, header {}",
            info.raw_size,
            info.image_size,
            if header_stripped { "stripped" } else { "absent" }
        );

        Ok(Self {
            data: data.to_vec(),
            info,
        })
    }

    /// Read and validate a firmware file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        Self::from_raw(&raw)
    }

    /// Image bytes, header already stripped.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`: validated images are never empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flash address of the first image byte.
    pub fn base_address(&self) -> u16 {
        BASE_ADDRESS
    }

    /// Descriptive data.
    pub fn info(&self) -> &FirmwareInfo {
        &self.info
    }
}

/// Read a NUL-terminated ASCII field, `None` if out of range or blank.
fn ascii_field(raw: &[u8], offset: usize) -> Option<String> {
    let field = raw.get(offset..offset + FIELD_LEN)?;
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field.len());
    let text = String::from_utf8_lossy(&field[..end])
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}
