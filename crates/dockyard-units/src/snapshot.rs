//! Content-addressed snapshots of a local directory.

use dockyard_core::resource::SnapshotRef;
use dockyard_core::{Error, Result, TargetEnvironment};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hash `dir` and describe where its archive lands in the assets bucket.
///
/// The digest covers relative paths and file contents in sorted order, so
/// the same tree always produces the same object key regardless of
/// timestamps or traversal order.
pub fn capture(dir: &Path, env: &TargetEnvironment) -> Result<SnapshotRef> {
    if !dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "seed directory '{}' does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let contents = std::fs::read(dir.join(relative))?;
        hasher.update(portable(relative).as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    let sha256 = hex::encode(hasher.finalize());

    Ok(SnapshotRef {
        path: dir.display().to_string(),
        bucket: env.assets_bucket(),
        object_key: format!("{}.zip", sha256),
        sha256,
        file_count: files.len(),
    })
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::Internal(e.to_string()))?
                .to_path_buf();
            out.push(relative);
        }
    }
    Ok(())
}

fn portable(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
