// Scratch file ownership for one job

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of every scratch document
pub const SCRATCH_SUFFIX: &str = ".pdf";

/// Local copy of a source document, owned by one controller invocation
///
/// `remove` is the normal cleanup path. `Drop` only covers an invocation that
/// was cancelled before reaching it.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    /// Derive the scratch path for a file id: `<dir>/<file_id>.pdf`
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are percent-encoded, so the id always
    /// names a single file inside `dir` and distinct ids get distinct files.
    pub fn for_file_id(dir: &Path, file_id: &str) -> Self {
        Self {
            path: dir.join(format!("{}{}", sanitize_file_id(file_id), SCRATCH_SUFFIX)),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file if it exists
    ///
    /// Failures are logged and swallowed.
    pub async fn remove(&mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Scratch file deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete scratch file"
            ),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9._-]` (including `%`)
///
/// The encoding is injective, so distinct ids never share a scratch file.
fn sanitize_file_id(file_id: &str) -> String {
    if file_id.is_empty() {
        // A lone `%` is never produced by the encoding below
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(file_id.len());
    for byte in file_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_deterministic() {
        let dir = Path::new("/tmp/scratch");
        let a = ScratchFile::for_file_id(dir, "3f2a-uuid");
        let b = ScratchFile::for_file_id(dir, "3f2a-uuid");
        assert_eq!(a.path(), b.path());
        assert_eq!(a.path(), Path::new("/tmp/scratch/3f2a-uuid.pdf"));
    }

    #[test]
    fn test_path_cannot_escape_dir() {
        let dir = Path::new("/tmp/scratch");
        let scratch = ScratchFile::for_file_id(dir, "../../etc/passwd");
        assert_eq!(scratch.path().parent(), Some(dir));
        assert_eq!(
            scratch.path(),
            Path::new("/tmp/scratch/..%2F..%2Fetc%2Fpasswd.pdf")
        );
    }

    #[test]
    fn test_distinct_ids_get_distinct_files() {
        let dir = Path::new("/tmp/scratch");
        let ids = ["a/b", "a_b", "a%2Fb", "a b", "", "%", "ü"];
        let paths: std::collections::HashSet<PathBuf> = ids
            .iter()
            .map(|id| ScratchFile::for_file_id(dir, id).path().to_path_buf())
            .collect();

        assert_eq!(paths.len(), ids.len());
        for path in &paths {
            assert_eq!(path.parent(), Some(dir));
        }
        assert_eq!(
            ScratchFile::for_file_id(dir, "a%2Fb").path(),
            Path::new("/tmp/scratch/a%252Fb.pdf")
        );
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchFile::for_file_id(dir.path(), "never-written");
        scratch.remove().await;
        assert!(!scratch.path().exists());
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::for_file_id(dir.path(), "f1");
            std::fs::write(scratch.path(), b"%PDF").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
