//! Shell completion generation.

use {
    crate::{Cli, CliError},
    anyhow::Result,
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    std::{env, io, path::Path},
};

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let shell = match shell {
        Some(shell) => shell,
        None => detect_shell_type().ok_or_else(|| {
            CliError::Usage(
                "Could not detect your shell; specify it explicitly, e.g. fsflash completions bash"
                    .to_string(),
            )
        })?,
    };

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }

    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }

    None
}

/// Parse a shell binary path into its `Shell` enum.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}
