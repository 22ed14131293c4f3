//! Flash command implementation.

use {
    crate::{
        Cli, CliError,
        commands::firmware::resolve_firmware,
        config::Config,
        serial::{SerialOptions, select_serial_port},
        use_fancy_output,
    },
    anyhow::{Context, Result},
    console::style,
    fsflash::{FirmwareImage, Flasher, TransportConfig, UploadConfig, port::DEFAULT_TIMEOUT},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    std::{path::PathBuf, thread, time::Duration},
};

/// Pause between rounds with `--retry-forever`.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Options of the `flash` command.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlashOptions {
    /// Firmware path, discovered when absent.
    pub(crate) firmware: Option<PathBuf>,
    /// Start over after a failure.
    pub(crate) retry_forever: bool,
    /// Retries per block, overriding the config file.
    pub(crate) max_retries: Option<u32>,
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, options: &FlashOptions) -> Result<()> {
    loop {
        match flash_once(cli, config, options) {
            Ok(()) => return Ok(()),
            Err(err) if options.retry_forever && is_retryable(&err) => {
                eprintln!(
                    "{} {err:#}",
                    style("✗").red().bold()
                );
                eprintln!("{} Starting over...", style("↻").yellow());
                thread::sleep(RETRY_DELAY);
            },
            Err(err) => return Err(err),
        }
    }
}

/// Usage, config and cancellation errors would fail the same way again.
fn is_retryable(err: &anyhow::Error) -> bool {
    !err.chain()
        .any(|cause| cause.is::<CliError>())
}

fn transport_config(cli: &Cli, config: &Config) -> TransportConfig {
    TransportConfig {
        read_timeout: config
            .read_timeout()
            .unwrap_or(DEFAULT_TIMEOUT),
        log_traffic: cli.verbose >= 1,
    }
}

fn upload_config(options: &FlashOptions, config: &Config) -> UploadConfig {
    let mut upload = UploadConfig::default();
    if let Some(max_retries) = options
        .max_retries
        .or(config.flash.max_retries)
    {
        upload.max_retries = max_retries;
    }
    upload
}

fn flash_once(cli: &Cli, config: &Config, options: &FlashOptions) -> Result<()> {
    let firmware = resolve_firmware(options.firmware.as_ref(), cli.non_interactive, cli.quiet)?;

    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }
    let image = FirmwareImage::from_file(&firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;

    if !cli.quiet {
        let info = image.info();
        eprintln!(
            "{} {} ({} bytes{})",
            style("ℹ").blue(),
            info.label(),
            info.image_size,
            if info.header_stripped {
                ", header stripped"
            } else {
                ""
            }
        );
    }

    let serial_options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let port = select_serial_port(&serial_options, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {port} at {} baud",
            style("🔌").cyan(),
            fsflash::port::DEFAULT_BAUD
        );
    }

    let mut flasher = Flasher::open(
        &port,
        transport_config(cli, config),
        upload_config(options, config),
    )
    .with_context(|| format!("Failed to open port {port}"))?;

    if !cli.quiet {
        eprintln!("{} Waiting for boot loader...", style("⏳").yellow());
    }

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(image.len() as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb
    };
    pb.set_message("Uploading");

    // Ping, upload and restart; the failure is logged before the port is released
    let report = match flasher.flash(&image, |done, _total| pb.set_position(done as u64)) {
        Ok(report) => report,
        Err(err) => {
            pb.abandon_with_message("Failed");
            return Err(err.into());
        },
    };
    pb.finish_with_message("Done");

    if !cli.quiet {
        eprintln!(
            "{} Wrote {} bytes in {} blocks ({} retries)",
            style("✓").green(),
            report.bytes_written,
            report.blocks,
            report.retries
        );
        eprintln!("\n{} Flashing complete", style("🎉").green().bold());
    }

    Ok(())
}
