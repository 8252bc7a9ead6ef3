use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA256 digest of the file at `path` and return it as a hex string.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Write the SHA256 digest of `path` into the `output` file.
pub fn write_sha256(path: &Path, output: &Path) -> Result<String> {
    let digest = compute_sha256(path)?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create digest directory: {}", parent.display()))?;
    }
    let mut file = File::create(output)
        .with_context(|| format!("Failed to create digest file: {}", output.display()))?;
    writeln!(file, "{}  {}", digest, path.display()).with_context(|| {
        format!(
            "Failed to write digest for '{}' into '{}'.",
            path.display(),
            output.display()
        )
    })?;
    Ok(digest)
}

/// Hex SHA256 of an in-memory string, used for cache slot addressing.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn compute_sha256_is_stable() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("digest.bin");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"benchgate").unwrap();

        let digest = compute_sha256(&file_path).unwrap();
        assert_eq!(
            digest,
            "db152aba6a2ba7cdee22dab03eefc6e129a8e58c5ed1f6559458b0c988498691"
        );
        assert_eq!(digest, sha256_hex("benchgate"));
    }

    #[test]
    fn write_sha256_emits_checksum_line() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("artifact.json");
        std::fs::write(&file_path, b"{}").unwrap();

        let out_path = temp.path().join("artifact.json.sha256");
        let digest = write_sha256(&file_path, &out_path).unwrap();

        let content = std::fs::read_to_string(&out_path).unwrap();
        assert!(content.starts_with(&digest));
        assert!(content.contains("artifact.json"));
    }
}
