use std::{fs, io::Write, path::Path};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// If the path exists but is not a directory, this returns
/// [`FileSystemError::NotADirectory`].
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| FileSystemError::Directory {
            path: path.to_path_buf(),
            action: "create",
            source: err,
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Removes the specified file or directory.
///
/// A missing path is not an error.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| FileSystemError::File {
        path: path.to_path_buf(),
        action: "remove",
        source: err,
    })
}

/// Atomically writes `content` to `target`.
///
/// The bytes are written to a uniquely named temporary file in the target's
/// directory, flushed, and then renamed over the target. Readers either see
/// the previous file or the complete new one, never a partial write. Several
/// processes racing on the same target end with one complete winner.
pub fn atomic_write<P: AsRef<Path>>(target: P, content: &[u8]) -> FileSystemResult<()> {
    let target = target.as_ref();
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir_exists(parent)?;

    let file_err = |action: &'static str| {
        move |err: std::io::Error| FileSystemError::File {
            path: target.to_path_buf(),
            action,
            source: err,
        }
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".strata-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(file_err("create temporary"))?;
    temp.write_all(content).map_err(file_err("write temporary"))?;
    temp.as_file().sync_all().map_err(file_err("sync temporary"))?;
    temp.persist(target)
        .map_err(|err| file_err("publish")(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_safe_remove_file_and_dir() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("entry.json");
        fs::write(&file_path, "{}").unwrap();
        safe_remove(&file_path).unwrap();
        assert!(!file_path.exists());

        let sub_dir = dir.path().join("artifacts");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("a.json"), "{}").unwrap();
        safe_remove(&sub_dir).unwrap();
        assert!(!sub_dir.exists());
    }

    #[test]
    fn test_safe_remove_non_existent() {
        let dir = tempdir().unwrap();
        safe_remove(dir.path().join("missing")).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(matches!(
            ensure_dir_exists(&file_path),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_atomic_write_creates_parent_and_replaces() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("plan.json");

        atomic_write(&target, b"first").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");

        atomic_write(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn test_atomic_write_leaves_no_temporaries() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("plan.json");
        atomic_write(&target, b"clean").unwrap();

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| name.ends_with(".tmp"))
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
