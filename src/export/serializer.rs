//! Checksummed on-disk envelope
//!
//! Both formats carry the same fields: magic bytes, format version, metadata,
//! payload and an FNV-1a checksum of the payload. The binary payload is the
//! bincode encoding of the artifact; the JSON payload is its JSON text.

use super::artifact::ArtifactMetadata;
use crate::error::{Result, SeverityError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Magic bytes opening every binary artifact
pub const MAGIC: [u8; 4] = *b"INJS";

/// Current envelope version
pub const FORMAT_VERSION: u32 = 1;

/// Serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Binary format using bincode (efficient)
    #[default]
    Binary,
    /// JSON format (portable, human-readable)
    Json,
}

impl ExportFormat {
    /// Guess the format from a file extension; anything but `.json` is binary
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Binary,
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = SeverityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "bin" => Ok(ExportFormat::Binary),
            "json" => Ok(ExportFormat::Json),
            other => Err(SeverityError::invalid_parameter("format", other, "expected binary or json")),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BinaryEnvelope {
    magic: [u8; 4],
    format_version: u32,
    metadata: ArtifactMetadata,
    payload: Vec<u8>,
    checksum: u64,
}

#[derive(Serialize, Deserialize)]
struct JsonEnvelope {
    magic: String,
    format_version: u32,
    metadata: ArtifactMetadata,
    payload: String,
    checksum: u64,
}

/// FNV-1a hash
pub fn checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn check_header(magic: &[u8], format_version: u32) -> Result<()> {
    if magic != MAGIC {
        return Err(SeverityError::SerializationError(
            "not an injury-severity artifact (bad magic bytes)".to_string(),
        ));
    }
    if format_version > FORMAT_VERSION {
        return Err(SeverityError::SerializationError(format!(
            "artifact format version {} is newer than supported version {}",
            format_version, FORMAT_VERSION
        )));
    }
    Ok(())
}

fn check_payload(payload: &[u8], expected: u64) -> Result<()> {
    if checksum(payload) != expected {
        return Err(SeverityError::SerializationError(
            "checksum verification failed, file may be corrupted".to_string(),
        ));
    }
    Ok(())
}

/// Write `body` inside an envelope
pub fn write<T: Serialize>(
    path: impl AsRef<Path>,
    metadata: &ArtifactMetadata,
    body: &T,
    format: ExportFormat,
) -> Result<()> {
    let bytes = match format {
        ExportFormat::Binary => {
            let payload = bincode::serialize(body)?;
            let envelope = BinaryEnvelope {
                magic: MAGIC,
                format_version: FORMAT_VERSION,
                metadata: metadata.clone(),
                checksum: checksum(&payload),
                payload,
            };
            bincode::serialize(&envelope)?
        }
        ExportFormat::Json => {
            let payload = serde_json::to_string(body)?;
            let envelope = JsonEnvelope {
                magic: String::from_utf8_lossy(&MAGIC).into_owned(),
                format_version: FORMAT_VERSION,
                metadata: metadata.clone(),
                checksum: checksum(payload.as_bytes()),
                payload,
            };
            serde_json::to_vec_pretty(&envelope)?
        }
    };

    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), format = ?format, "Wrote artifact");
    Ok(())
}

/// Read an envelope, detecting its format, and verify it before decoding the body
pub fn read<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<(ArtifactMetadata, T)> {
    let bytes = std::fs::read(path.as_ref())?;

    if bytes.starts_with(&MAGIC) {
        let envelope: BinaryEnvelope = bincode::deserialize(&bytes)?;
        check_header(&envelope.magic, envelope.format_version)?;
        check_payload(&envelope.payload, envelope.checksum)?;
        let body = bincode::deserialize(&envelope.payload)?;
        return Ok((envelope.metadata, body));
    }

    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        let envelope: JsonEnvelope = serde_json::from_slice(&bytes)?;
        check_header(envelope.magic.as_bytes(), envelope.format_version)?;
        check_payload(envelope.payload.as_bytes(), envelope.checksum)?;
        let body = serde_json::from_str(&envelope.payload)?;
        return Ok((envelope.metadata, body));
    }

    Err(SeverityError::SerializationError(format!(
        "'{}' is not an injury-severity artifact",
        path.as_ref().display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Body {
        weights: Vec<f64>,
        label: String,
    }

    fn body() -> Body {
        Body {
            weights: vec![0.25, -1.5, 3.0],
            label: "hospitalized".to_string(),
        }
    }

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(checksum(b""), 14695981039346656037);
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }

    #[test]
    fn test_binary_and_json_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ArtifactMetadata::new("degree");
        for (name, format) in [("m.bin", ExportFormat::Binary), ("m.json", ExportFormat::Json)] {
            let path = dir.path().join(name);
            write(&path, &metadata, &body(), format).unwrap();
            let (meta, restored): (ArtifactMetadata, Body) = read(&path).unwrap();
            assert_eq!(restored, body());
            assert_eq!(meta.target_column, "degree");
        }
    }

    #[test]
    fn test_corrupted_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.bin");
        write(&path, &ArtifactMetadata::new("degree"), &body(), ExportFormat::Binary).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 9;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = read::<Body>(&path).unwrap_err();
        assert!(matches!(err, SeverityError::SerializationError(_)));
    }

    #[test]
    fn test_unknown_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(read::<Body>(&path).is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path("model.json"), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path("model.bin"), ExportFormat::Binary);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
    }
}
