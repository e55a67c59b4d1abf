use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{GangplankError, GangplankResult};

/// Captured output of a finished child process.
#[derive(Clone, Debug, Default)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run a program to completion and capture both output streams. Leading and
/// trailing whitespace is trimmed from stdout. A non-zero exit status is
/// surfaced as a Subprocess error carrying both streams.
pub async fn run(program: &str, args: &[&str]) -> GangplankResult<CmdOutput> {
    debug!("Running {}: {}", program, args.join(" "));

    let output = Command::new(program).args(args).output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    print_debug_info(&stdout, &stderr);

    if !output.status.success() {
        return Err(GangplankError::Subprocess { stdout, stderr });
    }
    Ok(CmdOutput { stdout, stderr })
}

/// Run a host shell command non-interactively. The shell emits stdout as
/// UTF-16 with a BOM, so only stdout goes through the UTF-16 decoder.
pub async fn run_shell(args: &[&str]) -> GangplankResult<CmdOutput> {
    let mut shell_args = vec!["-NonInteractive"];
    shell_args.extend_from_slice(args);

    debug!("Running shell command: {}", args.join(" "));

    let output = Command::new("powershell").args(&shell_args).output().await?;

    let stdout = utf16_to_string(&output.stdout)?.trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    print_debug_info(&stdout, &stderr);

    if !output.status.success() {
        return Err(GangplankError::Subprocess { stdout, stderr });
    }
    Ok(CmdOutput { stdout, stderr })
}

/// Decode a UTF-16 buffer honouring a leading BOM (FF FE little endian,
/// FE FF big endian). Without a BOM the buffer is assumed little endian,
/// which is what the host shell writes. Odd-length input is malformed.
pub fn utf16_to_string(raw: &[u8]) -> GangplankResult<String> {
    if raw.len() % 2 != 0 {
        return Err(GangplankError::Encoding(
            "UTF-16 buffer length must be even".to_string(),
        ));
    }

    let (payload, big_endian) = match raw {
        [0xff, 0xfe, rest @ ..] => (rest, false),
        [0xfe, 0xff, rest @ ..] => (rest, true),
        _ => (raw, false),
    };

    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    Ok(String::from_utf16_lossy(&units))
}

fn print_debug_info(stdout: &str, stderr: &str) {
    let mut log_msg = String::new();
    if !stdout.is_empty() {
        log_msg += &format!("stdout: {};", stdout);
    }
    if !stderr.is_empty() {
        log_msg += &format!("stderr: {};", stderr);
    }
    if !log_msg.is_empty() {
        debug!("{}", log_msg);
    }
}

/// Capability object for host shell access so callers can be tested against
/// a scripted shell.
#[async_trait]
pub trait Shell: Send + Sync {
    async fn run(&self, args: &[&str]) -> GangplankResult<CmdOutput>;
}

pub struct PowerShell;

#[async_trait]
impl Shell for PowerShell {
    async fn run(&self, args: &[&str]) -> GangplankResult<CmdOutput> {
        run_shell(args).await
    }
}
