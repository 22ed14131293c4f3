//! Block-wise firmware upload with bounded retries.
//!
//! The image is written in 1024-byte blocks. Each block needs write permission
//! (a request-write exchange) followed by four 256-byte chunk writes. Any
//! failure inside a block drains stale input and restarts the block from its
//! request-write; a block that keeps failing aborts the upload.

use {
    crate::{
        error::{ProtocolError, UploadError},
        image::FirmwareImage,
        port::Port,
        protocol::command::CHUNK_SIZE,
        session::ProtocolSession,
    },
    log::{debug, error, info, warn},
};

/// Bytes covered by one write permission.
pub const BLOCK_SIZE: usize = 1024;

/// Chunks per block.
pub const CHUNKS_PER_BLOCK: usize = BLOCK_SIZE / CHUNK_SIZE;

/// Retries per block before the upload is aborted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fill byte for chunk space past the end of the image.
pub const PAD_BYTE: u8 = 0xFF;

/// Upload settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    /// Retries allowed per block; a block gets `max_retries + 1` attempts.
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Image bytes written.
    pub bytes_written: usize,
    /// Blocks written.
    pub blocks: usize,
    /// Block retries across the whole upload.
    pub retries: u32,
}

/// Image bytes carried by one chunk.
///
/// `len` is below [`CHUNK_SIZE`] only for the chunk holding the image tail,
/// and zero for chunks entirely past the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Image offset of the chunk.
    pub offset: usize,
    /// Image bytes in the chunk.
    pub len: usize,
}

/// One block of the upload plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    /// Image offset of the block.
    pub offset: usize,
    /// The block's chunks, in write order.
    pub chunks: [ChunkSpan; CHUNKS_PER_BLOCK],
}

/// Partition an image of `image_len` bytes into blocks.
pub fn plan_blocks(image_len: usize) -> impl Iterator<Item = BlockPlan> {
    (0..image_len)
        .step_by(BLOCK_SIZE)
        .map(move |offset| BlockPlan {
            offset,
            chunks: std::array::from_fn(|i| {
                let start = offset + i * CHUNK_SIZE;
                ChunkSpan {
                    offset: start,
                    len: image_len
                        .saturating_sub(start)
                        .min(CHUNK_SIZE),
                }
            }),
        })
}

/// Flash address of the image byte at `offset`.
#[allow(clippy::cast_possible_truncation)] // Image bounds keep every address below 0x10000
fn flash_address(base: u16, offset: usize) -> u16 {
    (usize::from(base) + offset) as u16
}

/// Drives the block-wise upload of one image over a session.
pub struct FirmwareUploader<'s, P: Port> {
    session: &'s mut ProtocolSession<P>,
    config: UploadConfig,
    offset: usize,
    retries: u32,
}

impl<'s, P: Port> FirmwareUploader<'s, P> {
    /// Create an uploader borrowing `session`.
    pub fn new(session: &'s mut ProtocolSession<P>, config: UploadConfig) -> Self {
        Self {
            session,
            config,
            offset: 0,
            retries: 0,
        }
    }

    /// Upload `image`.
    ///
    /// `progress` is called after every successful chunk with the number of
    /// image bytes confirmed so far and the image length. The count never
    /// decreases, even when a block is retried.
    pub fn upload<F>(mut self, image: &FirmwareImage, mut progress: F) -> Result<UploadReport, UploadError>
    where
        F: FnMut(usize, usize),
    {
        let data = image.data();
        let total = data.len();
        let base = image.base_address();
        let mut blocks = 0;

        info!(
            "Uploading {total} bytes to 0x{base:04X} in {} blocks",
            total.div_ceil(BLOCK_SIZE)
        );

        for block in plan_blocks(total) {
            self.write_block_with_retry(base, &block, data, &mut progress)?;
            blocks += 1;
        }

        info!("Upload complete: {blocks} blocks, {} retries", self.retries);

        Ok(UploadReport {
            bytes_written: self.offset,
            blocks,
            retries: self.retries,
        })
    }

    fn write_block_with_retry<F>(
        &mut self,
        base: u16,
        block: &BlockPlan,
        data: &[u8],
        progress: &mut F,
    ) -> Result<(), UploadError>
    where
        F: FnMut(usize, usize),
    {
        let address = flash_address(base, block.offset);
        let attempts = self.config.max_retries.saturating_add(1);

        let mut attempt = 1;

        loop {
            match self.write_block(base, block, data, progress) {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => {
                    error!("Block 0x{address:04X} failed after {attempts} attempts: {err}");
                    return Err(UploadError::RetryExhausted {
                        address,
                        attempts,
                        source: err,
                    });
                },
                Err(err) => {
                    warn!("Block 0x{address:04X} failed (attempt {attempt}/{attempts}): {err}");
                    self.retries += 1;
                    attempt += 1;

                    if let Err(e) = self
                        .session
                        .transport_mut()
                        .drain()
                    {
                        warn!("Failed to drain input: {e}");
                    }
                },
            }
        }
    }

    fn write_block<F>(
        &mut self,
        base: u16,
        block: &BlockPlan,
        data: &[u8],
        progress: &mut F,
    ) -> Result<(), ProtocolError>
    where
        F: FnMut(usize, usize),
    {
        let total = data.len();

        self.session
            .request_write(flash_address(base, block.offset))?;

        for chunk in &block.chunks {
            let mut buf = [PAD_BYTE; CHUNK_SIZE];
            // Chunks wholly past the end of the image are pure padding
            if chunk.len > 0 {
                buf[..chunk.len].copy_from_slice(&data[chunk.offset..chunk.offset + chunk.len]);
            }

            self.session
                .write_chunk(flash_address(base, chunk.offset), &buf)?;

            let position = (chunk.offset + chunk.len).min(total);
            self.offset = self.offset.max(position);
            progress(self.offset, total);
        }

        debug!("Block 0x{:04X} written", flash_address(base, block.offset));
        Ok(())
    }
}

/// Upload `image` over `session` with `config`.
pub fn upload_firmware<P, F>(
    session: &mut ProtocolSession<P>,
    image: &FirmwareImage,
    config: UploadConfig,
    progress: F,
) -> Result<UploadReport, UploadError>
where
    P: Port,
    F: FnMut(usize, usize),
{
    FirmwareUploader::new(session, config).upload(image, progress)
}
