//! Emulator launch (§6 "Emulator launch", ADDED): an external-collaborator
//! wrapper around `xemu`, grounded on `server.py`'s
//! `subprocess.call([xemu_path, '-dvd_path', dvd_url])` plus its preceding
//! `os.chdir` to the emulator's own directory (so relative paths in
//! `xemu`'s own config resolve the way a user double-clicking it would
//! see).

use std::path::Path;
use std::process::Command;

use xiso_serve_core::{Error, Result};

/// Launches `xemu_path` with `-dvd_path <dvd_url>`, blocking until it
/// exits. The working directory is changed to `xemu_path`'s parent first,
/// matching the reference behavior of launching the emulator as if from
/// its own install directory.
pub fn launch_emulator(xemu_path: &Path, dvd_url: &str) -> Result<()> {
    let work_dir = xemu_path.parent().filter(|p| !p.as_os_str().is_empty());

    let mut command = Command::new(xemu_path);
    command.arg("-dvd_path").arg(dvd_url);
    if let Some(dir) = work_dir {
        command.current_dir(dir);
    }

    tracing::info!(xemu = %xemu_path.display(), dvd_url, "launching emulator");

    let status = command.status().map_err(Error::from)?;
    if !status.success() {
        tracing::warn!(?status, "xemu exited with a non-zero status");
    }
    Ok(())
}

/// Percent-encodes `path`'s filename the way `urllib.parse.quote_plus` did
/// in the reference launch URL, so the emulator receives the same
/// `http://127.0.0.1:<port>/<name>` it would have from the original
/// server.
pub fn build_dvd_url(port: u16, filename: &str) -> String {
    let encoded = percent_encode(filename);
    format!("http://127.0.0.1:{port}/{encoded}")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dvd_url_plain_name() {
        assert_eq!(build_dvd_url(8000, "game.iso"), "http://127.0.0.1:8000/game.iso");
    }

    #[test]
    fn test_build_dvd_url_encodes_space() {
        assert_eq!(build_dvd_url(8000, "Halo 2.iso"), "http://127.0.0.1:8000/Halo+2.iso");
    }

    #[test]
    fn test_build_dvd_url_encodes_special_chars() {
        assert_eq!(build_dvd_url(8000, "a&b.iso"), "http://127.0.0.1:8000/a%26b.iso");
    }
}
