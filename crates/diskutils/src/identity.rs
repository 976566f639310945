use std::path::Path;

use anyhow::{anyhow, bail, Context, Error};

const MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Returns the hostname of the running system.
pub fn hostname() -> Result<String, Error> {
    hostname::get()
        .context("Failed to read hostname")?
        .into_string()
        .map_err(|raw| {
            anyhow!(
                "Hostname is not valid UTF-8: {}",
                raw.to_string_lossy()
            )
        })
}

/// Returns the machine id as its 32-character lowercase hex string.
pub fn machine_id() -> Result<String, Error> {
    machine_id_from(Path::new(MACHINE_ID_PATH))
}

fn machine_id_from(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read machine id from '{}'", path.display()))?;
    let id = raw.trim();
    if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!(
            "Machine id '{}' read from '{}' is not a 32-character hex string",
            id,
            path.display()
        );
    }
    Ok(id.to_ascii_lowercase())
}
