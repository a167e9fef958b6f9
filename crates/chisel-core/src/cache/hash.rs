use std::path::Path;

/// Compute the MD5 digest of source text as lowercase hex
///
/// The digest is compared byte-for-byte against the `sourceMD5` values
/// persisted in the status file, so the rendering must never change.
pub fn digest(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Read a file as UTF-8 and return `(text, digest)`
pub fn digest_file(path: &Path) -> std::io::Result<(String, String)> {
    let text = std::fs::read_to_string(path)?;
    let hash = digest(&text);
    Ok((text, hash))
}
