//! Serial port selection.
//!
//! The port comes from, in order: the `--port` flag (or `FSFLASH_PORT`), the
//! config file, automatic selection of a single candidate, or an interactive
//! prompt. Non-interactive mode never prompts.

use {
    crate::{CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    fsflash::{NativePortEnumerator, PortEnumerator, PortInfo},
    log::{debug, info},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if the choice is ambiguous).
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Select a serial port name.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(port_name) = &options.port {
        return Ok(port_name.clone());
    }

    if let Some(port_name) = &config.port.serial {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;
    let candidates = preferred_ports(ports);

    if options.non_interactive {
        return select_non_interactive_port(candidates).map(|p| p.name);
    }

    match candidates.len().cmp(&1) {
        Ordering::Equal => {
            let port = candidates
                .into_iter()
                .next()
                .ok_or_else(|| usage_err("No serial ports found"))?;
            info!("Auto-selected port: {}", port.name);
            Ok(port.name)
        },
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates).map(|p| p.name)
        },
        Ordering::Less => Err(usage_err("No serial ports found; connect the transmitter or pass --port")),
    }
}

/// USB ports when there are any, every port otherwise.
fn preferred_ports(ports: Vec<PortInfo>) -> Vec<PortInfo> {
    if ports.iter().any(PortInfo::is_usb) {
        ports
            .into_iter()
            .filter(PortInfo::is_usb)
            .collect()
    } else {
        ports
    }
}

fn select_non_interactive_port(candidates: Vec<PortInfo>) -> Result<PortInfo> {
    match candidates.len().cmp(&1) {
        Ordering::Equal => candidates
            .into_iter()
            .next()
            .ok_or_else(|| usage_err("No serial ports found")),
        Ordering::Greater => Err(usage_err(
            "Found multiple serial ports; pass --port in non-interactive mode",
        )),
        Ordering::Less => Err(usage_err("No serial ports found; pass --port")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Interactive selection requires a terminal; pass --port",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Selection cancelled".to_string()).into()
            } else {
                usage_err("Prompt failed")
            }
        },
    }
}

/// Display label for a port.
pub(crate) fn port_label(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{vid_pid}{product}", port.name)
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<PortInfo> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Selection cancelled".to_string()).into()),
    }
}
