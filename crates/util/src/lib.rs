use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod dns;

/// Replace a persisted document atomically: write a sibling temp file,
/// tighten its permissions, then rename it over the destination.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("destination path has no file name")?;
    let dir = path
        .parent()
        .context("destination path has no parent directory")?;
    let tmp = dir.join(format!("{file_name}.tmp"));

    fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
    set_permissions_0600(&tmp)?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn set_permissions_0600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

pub fn set_permissions_0700(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o700);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}
