//! Firmware info and port listing command implementations.

use {
    crate::serial::port_label,
    anyhow::{Context, Result},
    console::style,
    fsflash::{FirmwareImage, FirmwareInfo, NativePortEnumerator, PortEnumerator, upload::BLOCK_SIZE},
    std::path::Path,
};

/// JSON document for `info --json`.
fn info_json(path: &Path, info: &FirmwareInfo, base_address: u16) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "data": {
            "file": path.display().to_string(),
            "firmware": info,
            "base_address": format!("0x{base_address:04X}"),
            "blocks": info.image_size.div_ceil(BLOCK_SIZE),
        }
    })
}

fn load(firmware: &Path) -> Result<FirmwareImage> {
    FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))
}

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    if json {
        let image = load(firmware)?;
        let output = info_json(firmware, image.info(), image.base_address());
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{} Loading firmware {}",
        style("📦").cyan(),
        firmware.display()
    );
    let image = load(firmware)?;
    let info = image.info();

    eprintln!(
        "\n{}",
        style("Firmware Information")
            .bold()
            .underlined()
    );
    eprintln!(
        "  Name:          {}",
        info.name.as_deref().unwrap_or("-")
    );
    eprintln!(
        "  Build date:    {}",
        info.build_date.as_deref().unwrap_or("-")
    );
    eprintln!("  File size:     {} bytes", info.raw_size);
    eprintln!("  Image size:    {} bytes", info.image_size);
    eprintln!(
        "  Header:        {}",
        if info.header_stripped {
            style("present (stripped)").yellow().to_string()
        } else {
            "absent".to_string()
        }
    );
    eprintln!("  Flash address: 0x{:04X}", image.base_address());
    eprintln!(
        "  Blocks:        {}",
        info.image_size.div_ceil(BLOCK_SIZE)
    );

    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available Serial Ports")
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        eprintln!(
            "  {} {}",
            style("•").green(),
            port_label(port)
        );
    }

    if let Ok(auto_port) = NativePortEnumerator::auto_detect() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> FirmwareInfo {
        FirmwareInfo {
            name: Some("FS-i6X 2.0.3".to_string()),
            build_date: None,
            raw_size: 0xF800,
            image_size: 0xE000,
            header_stripped: true,
        }
    }

    #[test]
    fn test_info_json_shape() {
        let value = info_json(Path::new("fw.bin"), &sample_info(), 0x1800);

        assert_eq!(value["ok"], true);
        let data = &value["data"];
        assert_eq!(data["file"], "fw.bin");
        assert_eq!(data["base_address"], "0x1800");
        assert_eq!(data["blocks"], 56);
        assert_eq!(data["firmware"]["name"], "FS-i6X 2.0.3");
        assert!(data["firmware"]["build_date"].is_null());
        assert_eq!(data["firmware"]["image_size"], 0xE000);
        assert_eq!(data["firmware"]["header_stripped"], true);
    }

    #[test]
    fn test_info_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_info(&dir.path().join("missing.bin"), true).is_err());
    }

    #[test]
    fn test_info_json_reads_valid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        std::fs::write(&path, vec![0u8; 0x9000]).unwrap();
        assert!(cmd_info(&path, true).is_ok());
    }
}
