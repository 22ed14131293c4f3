//! Discovery and interactive selection of firmware files.
//!
//! When the user omits the firmware path from the `flash` command, the current
//! directory is searched for `.bin` files that load as valid images. A single
//! candidate is used directly; several are offered in a selection prompt,
//! labelled with the firmware name and build date read from each file.

use {
    crate::{CliError, serial::map_prompt_error, use_fancy_output},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Select, theme::ColorfulTheme},
    fsflash::{FirmwareImage, FirmwareInfo},
    log::debug,
    std::{
        cmp::Ordering,
        io::IsTerminal,
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

/// A discovered firmware file candidate.
#[derive(Debug, Clone)]
pub struct FirmwareCandidate {
    /// Full path to the firmware file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Name and build date read from the image.
    pub info: FirmwareInfo,
}

impl FirmwareCandidate {
    /// Format file size in a human-readable way.
    #[allow(clippy::cast_precision_loss)]
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        if self.size >= KB {
            format!("{:.1} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} B", self.size)
        }
    }

    /// Format the display label for interactive selection.
    pub fn display_label(&self, base: &Path) -> String {
        let rel = self
            .path
            .strip_prefix(base)
            .unwrap_or(&self.path)
            .display();
        format!("{rel} ({}) {}", self.human_size(), self.info.label())
    }
}

/// List loadable `.bin` images directly inside `dir`, newest first.
///
/// Files the image loader rejects are skipped.
pub fn find_firmware_files(dir: &Path) -> Vec<FirmwareCandidate> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut candidates: Vec<FirmwareCandidate> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let is_bin = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"));
            let meta = entry.metadata().ok()?;
            if !(is_bin && meta.is_file()) {
                return None;
            }
            let image = match FirmwareImage::from_file(&path) {
                Ok(image) => image,
                Err(e) => {
                    debug!("Skipping {}: {e}", path.display());
                    return None;
                },
            };
            Some(FirmwareCandidate {
                size: meta.len(),
                modified: meta.modified().ok(),
                info: image.info().clone(),
                path,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        match (&b.modified, &a.modified) {
            (Some(bm), Some(am)) => bm.cmp(am),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.path.cmp(&b.path))
    });

    candidates
}

/// Resolve firmware path: if provided use directly, otherwise auto-discover.
pub fn resolve_firmware(firmware: Option<&PathBuf>, non_interactive: bool, quiet: bool) -> Result<PathBuf> {
    if let Some(path) = firmware {
        return Ok(path.clone());
    }

    let base = std::env::current_dir().context("Failed to get current directory")?;
    let candidates = find_firmware_files(&base);

    match candidates.len() {
        0 => Err(CliError::Usage(
            "No valid firmware file (*.bin) found in the current directory; pass the firmware path".to_string(),
        )
        .into()),
        1 => {
            let chosen = &candidates[0];
            if !quiet {
                eprintln!(
                    "{} Using firmware {}",
                    style("📦").cyan(),
                    chosen.display_label(&base)
                );
            }
            Ok(chosen.path.clone())
        },
        count => {
            if non_interactive {
                for c in &candidates {
                    eprintln!("  {}", c.display_label(&base));
                }
                return Err(CliError::Usage(format!(
                    "Found multiple firmware files ({count}); pass the firmware path in non-interactive mode"
                ))
                .into());
            }

            if !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
                return Err(CliError::Usage(
                    "Interactive selection requires a terminal; pass the firmware path".to_string(),
                )
                .into());
            }

            let labels: Vec<String> = candidates
                .iter()
                .map(|c| c.display_label(&base))
                .collect();

            let selection = if use_fancy_output() {
                Select::with_theme(&ColorfulTheme::default())
                    .with_prompt("Select firmware")
                    .items(&labels)
                    .default(0)
                    .interact_opt()
            } else {
                Select::new()
                    .with_prompt("Select firmware")
                    .items(&labels)
                    .default(0)
                    .interact_opt()
            }
            .map_err(map_prompt_error)?;

            match selection {
                Some(idx) => Ok(candidates[idx].path.clone()),
                None => Err(CliError::Cancelled("Firmware selection cancelled".to_string()).into()),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    const IMAGE_LEN: usize = 0x9000;

    fn create_files(dir: &Path, files: &[&str]) {
        for file in files {
            let path = dir.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, vec![0u8; IMAGE_LEN]).unwrap();
        }
    }

    fn info(name: Option<&str>) -> FirmwareInfo {
        FirmwareInfo {
            name: name.map(str::to_string),
            build_date: None,
            raw_size: IMAGE_LEN,
            image_size: IMAGE_LEN,
            header_stripped: false,
        }
    }

    #[test]
    fn test_find_no_firmware() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_firmware_files(tmp.path()).is_empty());
    }

    #[test]
    fn test_find_single_firmware() {
        let tmp = tempfile::tempdir().unwrap();
        create_files(tmp.path(), &["fs-i6x.bin", "notes.txt"]);
        let result = find_firmware_files(tmp.path());
        assert_eq!(result.len(), 1);
        assert!(result[0].path.ends_with("fs-i6x.bin"));
        assert_eq!(result[0].size, IMAGE_LEN as u64);
    }

    #[test]
    fn test_find_skips_invalid_images() {
        let tmp = tempfile::tempdir().unwrap();
        create_files(tmp.path(), &["good.bin"]);
        fs::write(tmp.path().join("small.bin"), vec![0u8; 1024]).unwrap();
        fs::write(tmp.path().join("huge.bin"), vec![0u8; 0x10000]).unwrap();

        let result = find_firmware_files(tmp.path());
        assert_eq!(result.len(), 1);
        assert!(result[0].path.ends_with("good.bin"));
    }

    #[test]
    fn test_find_reads_firmware_name() {
        let tmp = tempfile::tempdir().unwrap();
        let mut raw = vec![0u8; 0xE000];
        raw[0xD6AD..0xD6AD + 16].copy_from_slice(b"FS-i6X 2.0.3\0\0\0\0");
        raw[0xD6C0..0xD6C0 + 16].copy_from_slice(b"Mar 14 2019\0\0\0\0\0");
        fs::write(tmp.path().join("fw.bin"), &raw).unwrap();

        let result = find_firmware_files(tmp.path());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].info.label(), "FS-i6X 2.0.3 Mar 14 2019");
        assert_eq!(
            result[0].display_label(tmp.path()),
            "fw.bin (56.0 KB) FS-i6X 2.0.3 Mar 14 2019"
        );
    }

    #[test]
    fn test_find_ignores_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        create_files(tmp.path(), &["a.bin", "old/b.bin"]);
        fs::create_dir_all(tmp.path().join("dir.bin")).unwrap();
        let result = find_firmware_files(tmp.path());
        assert_eq!(result.len(), 1);
        assert!(result[0].path.ends_with("a.bin"));
    }

    #[test]
    fn test_case_insensitive_extension() {
        let tmp = tempfile::tempdir().unwrap();
        create_files(tmp.path(), &["A.BIN", "b.Bin"]);
        assert_eq!(find_firmware_files(tmp.path()).len(), 2);
    }

    #[test]
    fn test_human_size() {
        let c = FirmwareCandidate {
            path: PathBuf::from("fw.bin"),
            size: 512,
            modified: None,
            info: info(None),
        };
        assert_eq!(c.human_size(), "512 B");

        let c = FirmwareCandidate {
            path: PathBuf::from("fw.bin"),
            size: 0xE000,
            modified: None,
            info: info(None),
        };
        assert_eq!(c.human_size(), "56.0 KB");
    }

    #[test]
    fn test_display_label_is_relative() {
        let c = FirmwareCandidate {
            path: PathBuf::from("/work/fw.bin"),
            size: 2048,
            modified: None,
            info: info(Some("FS-i6X")),
        };
        assert_eq!(c.display_label(Path::new("/work")), "fw.bin (2.0 KB) FS-i6X");
    }

    #[test]
    fn test_resolve_with_explicit_path() {
        let p = PathBuf::from("/some/firmware.bin");
        assert_eq!(resolve_firmware(Some(&p), false, false).unwrap(), p);
    }
}
