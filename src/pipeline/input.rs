//! Source validation: make sure a path really is a readable PDF before
//! handing it to pdfium.
//!
//! pdfium reports every kind of bad input as an opaque load failure. Checking
//! existence, read permission and the `%PDF` magic up front turns the common
//! mistakes (wrong path, a `.pdf` that is really an HTML error page) into a
//! precise error without binding the pdfium library at all.

use crate::error::DegradeError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// The four bytes every PDF starts with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate that `path` exists, is readable and starts with the PDF magic.
///
/// Returns the file size in bytes on success.
pub fn validate_source(path: &Path) -> Result<u64, DegradeError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DegradeError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(DegradeError::DocumentCorrupt {
                path: path.to_path_buf(),
                detail: format!("cannot open: {e}"),
            });
        }
    };

    let size = file.metadata().map(|m| m.len()).unwrap_or(0);

    let mut magic = [0u8; 4];
    let read = read_prefix(&mut file, &mut magic).map_err(|e| DegradeError::DocumentCorrupt {
        path: path.to_path_buf(),
        detail: format!("cannot read: {e}"),
    })?;

    if &magic[..read] != PDF_MAGIC.as_slice() {
        return Err(DegradeError::NotAPdf {
            path: path.to_path_buf(),
            magic: magic[..read].to_vec(),
        });
    }

    debug!("Validated source PDF: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Read up to `buf.len()` bytes, stopping early only at end of file.
fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_source(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, DegradeError::SourceNotFound { .. }));
    }

    #[test]
    fn garbage_is_not_a_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"\x00\x13garbage bytes").unwrap();
        let err = validate_source(tmp.path()).unwrap_err();
        match err {
            DegradeError::NotAPdf { magic, .. } => assert_eq!(magic, b"\x00\x13ga".to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_file_is_not_a_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%P").unwrap();
        let err = validate_source(tmp.path()).unwrap_err();
        assert!(matches!(err, DegradeError::NotAPdf { .. }));
    }

    #[test]
    fn pdf_magic_passes_and_reports_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n%%EOF\n").unwrap();
        assert_eq!(validate_source(tmp.path()).unwrap(), 15);
    }
}
