//! Moving finished samples into a catalog directory.
//!
//! A promoted file appears under its final name fully written or not at all.
//! Within one filesystem that is a hard link (or a rename when replacing).
//! Across filesystems the bytes are first copied to a hidden partial file
//! inside the destination, which is then moved into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::CatalogMoveError;

/// Move `from` to `dest_dir/filename`.
///
/// Refuses to overwrite an existing file unless `replace` is set. On error
/// `from` is left where it was.
pub fn promote(from: &Path, dest_dir: &Path, filename: &str, replace: bool) -> Result<PathBuf, CatalogMoveError> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| CatalogMoveError::Destination(format!("{}: {}", dest_dir.display(), e)))?;
    if !dest_dir.is_dir() {
        return Err(CatalogMoveError::Destination(format!(
            "{} is not a directory",
            dest_dir.display()
        )));
    }

    let target = dest_dir.join(filename);
    if !replace && target.exists() {
        return Err(CatalogMoveError::Collision(target));
    }

    let io_error = |e: io::Error| CatalogMoveError::Io {
        from: from.to_path_buf(),
        to: target.clone(),
        reason: e.to_string(),
    };

    let placed = if replace {
        fs::rename(from, &target)
    } else {
        fs::hard_link(from, &target)
    };

    match placed {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(CatalogMoveError::Collision(target));
        }
        Err(e) => {
            log::debug!(
                "Direct move of {} failed ({}); copying through partial file",
                from.display(),
                e
            );
            copy_into_place(from, dest_dir, filename, &target, replace).map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => CatalogMoveError::Collision(target.clone()),
                _ => io_error(e),
            })?;
        }
    }

    if from.exists() {
        if let Err(e) = fs::remove_file(from) {
            log::warn!("Promoted {} but could not remove {}: {}", target.display(), from.display(), e);
        }
    }

    log::info!("Promoted sample to {}", target.display());
    Ok(target)
}

fn copy_into_place(from: &Path, dest_dir: &Path, filename: &str, target: &Path, replace: bool) -> io::Result<()> {
    let partial = dest_dir.join(format!(".{}.partial", filename));
    let result = fs::copy(from, &partial).and_then(|_| {
        if replace {
            fs::rename(&partial, target)
        } else {
            fs::hard_link(&partial, target)
        }
    });
    if partial.exists() {
        let _ = fs::remove_file(&partial);
    }
    result
}
