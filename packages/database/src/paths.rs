//! Filesystem helpers for the database location.

use std::path::Path;

/// Ensures a directory exists, creating it if necessary.
///
/// An empty path (the parent of a bare file name) is the current directory
/// and is left alone.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_accepts_empty_parent() {
        ensure_dir(Path::new("")).unwrap();
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let root = std::env::temp_dir().join(format!("cityscope-paths-{}", std::process::id()));
        let nested = root.join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }
}
