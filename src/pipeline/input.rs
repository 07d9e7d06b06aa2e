//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! URLs are downloaded into a `TempDir` that lives as long as the returned
//! [`ResolvedInput`], so the file is removed automatically once processing
//! ends. Both paths check the `%PDF` magic bytes before returning. Every
//! failure here means the source cannot be read and maps to
//! [`ScanError::SourceUnreadable`].

use crate::error::ScanError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ScanError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Validate a local file path: it must exist, be readable and start with `%PDF`.
pub fn resolve_local(path_str: &str) -> Result<ResolvedInput, ScanError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(ScanError::unreadable(path_str, "file not found"));
    }

    let mut file = std::fs::File::open(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ScanError::unreadable(path_str, "permission denied")
        } else {
            ScanError::unreadable(path_str, e.to_string())
        }
    })?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|_| ScanError::unreadable(path_str, "file is too short to be a PDF"))?;
    check_magic(path_str, &magic)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

fn check_magic(source: &str, magic: &[u8]) -> Result<(), ScanError> {
    if magic.len() < 4 || &magic[..4] != b"%PDF" {
        return Err(ScanError::unreadable(
            source,
            format!("not a PDF (first bytes: {:?})", &magic[..magic.len().min(4)]),
        ));
    }
    Ok(())
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ScanError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScanError::unreadable(url, e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ScanError::unreadable(url, format!("download timed out after {timeout_secs}s"))
        } else {
            ScanError::unreadable(url, format!("download failed: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(ScanError::unreadable(
            url,
            format!("HTTP {}", response.status()),
        ));
    }

    let filename = extract_filename(url);
    let temp_dir = TempDir::new().map_err(|e| ScanError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ScanError::unreadable(url, format!("download failed: {e}")))?;

    check_magic(url, &bytes)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://x.org/a/scan.pdf"), "scan.pdf");
        assert_eq!(extract_filename("https://x.org/a/"), "downloaded.pdf");
        assert_eq!(extract_filename("https://x.org/download"), "downloaded.pdf");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = resolve_local("/definitely/not/here.pdf").err().expect("error");
        assert!(matches!(err, ScanError::SourceUnreadable { .. }));
    }

    #[test]
    fn non_pdf_is_unreadable() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        f.write_all(b"GIF89a....").expect("write");
        let err = resolve_local(f.path().to_str().expect("utf8")).err().expect("error");
        assert!(err.to_string().contains("not a PDF"), "got: {err}");
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        f.write_all(b"%PDF-1.7\n").expect("write");
        let resolved = resolve_local(f.path().to_str().expect("utf8")).expect("ok");
        assert_eq!(resolved.path(), f.path());
    }
}
