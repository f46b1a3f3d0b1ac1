// pydeps-net/src/validation.rs
use pydeps_common::error::{PydepsError, Result};
use sha2::{Digest, Sha256};
use url::Url;

/// Validates an index or artifact URL, which must be http or https.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| PydepsError::ValidationError(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(PydepsError::ValidationError(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, but got '{other}'"
        ))),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verifies the SHA256 of downloaded bytes against a published digest.
pub fn verify_checksum(data: &[u8], expected: &str, label: &str) -> Result<()> {
    let actual = sha256_hex(data);
    tracing::debug!("Calculated SHA256 for {label}: {actual} ({} bytes)", data.len());
    tracing::debug!("Expected SHA256:   {expected}");
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(PydepsError::ChecksumMismatch(format!(
            "Checksum mismatch for {label}: expected {expected}, got {actual}"
        )))
    }
}

/// Checks that downloaded bytes look like the archive format the filename
/// promises. Formats `infer` cannot sniff are accepted.
pub fn verify_content_type(data: &[u8], filename: &str) -> Result<()> {
    let lower = filename.to_ascii_lowercase();
    let expected = if lower.ends_with(".whl") || lower.ends_with(".zip") {
        "zip"
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        "gz"
    } else if lower.ends_with(".tar.bz2") {
        "bz2"
    } else {
        return Ok(());
    };
    match infer::get(data) {
        Some(kind) if kind.extension().eq_ignore_ascii_case(expected) => {
            tracing::debug!("Content type verified: {filename} is {expected}");
            Ok(())
        }
        Some(kind) => Err(PydepsError::ValidationError(format!(
            "Content type mismatch for {filename}: expected '{expected}', detected '{}'",
            kind.extension()
        ))),
        None => Err(PydepsError::ValidationError(format!(
            "Could not determine content type for {filename}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_schemes() {
        assert!(validate_url("https://pypi.org/simple").is_ok());
        assert!(validate_url("http://localhost:8080/simple").is_ok());
        assert!(validate_url("ftp://mirror/simple").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn checksums() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_checksum(b"abc", &digest.to_uppercase(), "abc").is_ok());
        assert!(matches!(
            verify_checksum(b"abd", &digest, "abd"),
            Err(PydepsError::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn content_types() {
        let zip_magic = b"PK\x03\x04\x14\x00\x00\x00\x08\x00";
        let gzip_magic = b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x00\x03";
        assert!(verify_content_type(zip_magic, "a-1.0-py3-none-any.whl").is_ok());
        assert!(verify_content_type(gzip_magic, "a-1.0.tar.gz").is_ok());
        assert!(verify_content_type(gzip_magic, "a-1.0.zip").is_err());
        assert!(verify_content_type(b"anything", "a-1.0.tar").is_ok());
    }
}
