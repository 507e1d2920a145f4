//! Filesystem writes for staged content and pod manifests.
//!
//! Directories are created `0755` and files `0644`. Permissions are set
//! explicitly after every write so a re-run also repairs files left with
//! other modes.

use std::collections::BTreeMap;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use staticpod_common::{Error, Result};

/// Mode for every directory the installer creates
pub const DIR_MODE: u32 = 0o755;
/// Mode for every file the installer writes
pub const FILE_MODE: u32 = 0o644;

/// Create `path` and any missing parents
pub fn ensure_dir(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
        .map_err(|e| Error::io(path, e))
}

/// Write `content` to `path`, replacing any existing file
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(content).map_err(|e| Error::io(path, e))?;
    file.set_permissions(Permissions::from_mode(FILE_MODE))
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Write `dir/file_name` so readers never observe a partial file.
///
/// Content goes to a hidden sibling first and is renamed into place. Static
/// pod watchers skip dot-files, so the temporary file is never picked up.
pub fn write_file_atomic(dir: &Path, file_name: &str, content: &[u8]) -> Result<PathBuf> {
    let target = dir.join(file_name);
    let tmp = dir.join(format!(".{file_name}.tmp"));
    write_file(&tmp, content)?;
    fs::rename(&tmp, &target).map_err(|e| Error::io(&target, e))?;
    Ok(target)
}

/// Whether `key` can be used verbatim as one file name
pub fn is_valid_file_name(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\0'])
}

/// Write one file per entry under `dir`, creating `dir` first.
///
/// Keys must already be valid file names. Returns the written paths in key order.
pub fn write_content_dir(dir: &Path, content: &BTreeMap<String, Vec<u8>>) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut written = Vec::with_capacity(content.len());
    for (key, bytes) in content {
        let path = dir.join(key);
        debug!(path = %path.display(), bytes = bytes.len(), "Writing file");
        write_file(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}
