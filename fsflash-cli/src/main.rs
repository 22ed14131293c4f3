//! fsflash CLI - Command-line tool for flashing FlySky transmitters.
//!
//! ## Features
//!
//! - Flash firmware images over the serial boot loader
//! - Firmware auto-discovery and interactive selection
//! - Interactive serial port selection
//! - Firmware and port inspection with JSON output
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{
        path::PathBuf,
        process::ExitCode,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;
mod serial;

use {
    commands::{
        completions::cmd_completions,
        flash::{FlashOptions, cmd_flash},
        info::{cmd_info, cmd_list_ports},
    },
    config::Config,
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress bars and symbols should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// CLI failure classes with dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing input that a flag would fix.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration file.
    #[error("{0}")]
    Config(String),
    /// The user backed out of a prompt.
    #[error("{0}")]
    Cancelled(String),
}

/// fsflash - A cross-platform tool for flashing FlySky transmitters.
///
/// Environment variables:
///   FSFLASH_PORT              - Default serial port
///   FSFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "fsflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  fsflash flash firmware.bin\n  fsflash -p /dev/ttyUSB0 flash\n  fsflash info firmware.bin --json")]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "FSFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Verbose output level (-v shows serial traffic, -vv adds trace output).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "FSFLASH_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a firmware image.
    Flash {
        /// Path to the firmware file (discovered in the current directory if omitted).
        firmware: Option<PathBuf>,

        /// Start over after a failure until flashing succeeds.
        #[arg(long)]
        retry_forever: bool,

        /// Retries per block before the upload is aborted.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
    },

    /// Show information about a firmware file.
    Info {
        /// Path to the firmware file.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => 2,
                CliError::Config(_) => 3,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<fsflash::Error>() {
            if is_port_failure(lib_err) {
                return 4;
            }
        }
    }
    1
}

/// Whether the port is missing, could not be opened, or failed under an
/// exchange. Timeouts and bad answers are device-side and stay generic.
fn is_port_failure(err: &fsflash::Error) -> bool {
    use fsflash::{Error, ProtocolError, TransportError, UploadError};

    let transport = match err {
        Error::DeviceNotFound | Error::Serial(_) => return true,
        Error::Transport(t)
        | Error::Protocol(ProtocolError::Transport(t))
        | Error::Upload(UploadError::RetryExhausted {
            source: ProtocolError::Transport(t),
            ..
        }) => t,
        _ => return false,
    };
    matches!(transport, TransportError::Serial(_))
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            retry_forever,
            max_retries,
        } => {
            let options = FlashOptions {
                firmware: firmware.clone(),
                retry_forever: *retry_forever,
                max_retries: *max_retries,
            };
            cmd_flash(cli, &config, &options)
        },
        Commands::Info { firmware, json } => cmd_info(firmware, *json),
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => cmd_completions(*shell),
    }
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if std::env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "fsflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!(
                "{} {err:#}",
                style("Error:")
                    .red()
                    .bold()
            );
            ExitCode::from(exit_code(&err))
        },
    }
}
