//! # Model Artifact Container
//!
//! A model is a single self-contained file (conventionally `.sttm`) holding
//! the frontend parameters, acoustic weights, symbol inventory, lexicon and
//! language model.
//!
//! ## Layout (little-endian):
//! ```text
//! offset  size         field
//! 0       4            magic "STTM"
//! 4       2            format version (1)
//! 6       2            reserved (0)
//! 8       4            header_len
//! 12      8            weights_len
//! 20      header_len   JSON ModelHeader
//! ..      weights_len  safetensors acoustic weights
//! ..      4            CRC-32 of every preceding byte
//! ```
//!
//! Any disagreement between the declared lengths, the file size or the
//! checksum rejects the file before anything is parsed.

use crate::audio::FrontendConfig;
use crate::error::{EngineError, EngineResult};
use crate::transcription::acoustic::AcousticConfig;
use crate::transcription::checksum::{crc32, Crc32};
use crate::transcription::lexicon::LanguageModelSpec;
use crate::transcription::license::LicenseTerms;
use crate::transcription::postprocess::PostProcessConfig;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"STTM";
pub const FORMAT_VERSION: u16 = 1;

const PREFIX_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;

/// Everything about a model except its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHeader {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub acoustic: AcousticConfig,
    /// Inventory spellings; position is the symbol id
    pub symbols: Vec<String>,
    #[serde(default)]
    pub language_model: LanguageModelSpec,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
    #[serde(default)]
    pub license: Option<LicenseTerms>,
}

impl ModelHeader {
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidModel("model name is empty".into()));
        }
        if self.symbols.is_empty() {
            return Err(EngineError::InvalidModel("model defines no symbols".into()));
        }
        self.frontend.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub header: ModelHeader,
    pub weights: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(header: ModelHeader, weights: Vec<u8>) -> Self {
        Self { header, weights }
    }

    /// ## Returns:
    /// - **Err(InvalidModel)**: missing, unreadable, truncated, corrupted or malformed
    pub fn read_from_path(path: &Path) -> EngineResult<Self> {
        if !path.is_file() {
            return Err(EngineError::InvalidModel(format!(
                "model file could not be found at '{}'",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|e| {
            EngineError::InvalidModel(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let invalid = |msg: &str| EngineError::InvalidModel(msg.to_string());

        if bytes.len() < PREFIX_LEN + CHECKSUM_LEN {
            return Err(invalid("file is too small to be a model artifact"));
        }
        if bytes[..4] != MAGIC {
            return Err(invalid("file is not a model artifact (bad magic)"));
        }

        let mut cursor = Cursor::new(&bytes[4..PREFIX_LEN]);
        let truncated = |_| invalid("truncated artifact prefix");
        let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let _reserved = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let header_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let weights_len = cursor.read_u64::<LittleEndian>().map_err(truncated)?;

        if version != FORMAT_VERSION {
            return Err(EngineError::InvalidModel(format!(
                "unsupported artifact format version {}",
                version
            )));
        }

        let weights_len = usize::try_from(weights_len).map_err(|_| invalid("weights section too large"))?;
        let expected = PREFIX_LEN
            .checked_add(header_len)
            .and_then(|n| n.checked_add(weights_len))
            .and_then(|n| n.checked_add(CHECKSUM_LEN))
            .ok_or_else(|| invalid("declared section lengths overflow"))?;
        if expected != bytes.len() {
            return Err(EngineError::InvalidModel(format!(
                "artifact is {} bytes but its sections declare {}",
                bytes.len(),
                expected
            )));
        }

        let body_end = bytes.len() - CHECKSUM_LEN;
        let stored = Cursor::new(&bytes[body_end..])
            .read_u32::<LittleEndian>()
            .map_err(|_| invalid("missing checksum"))?;
        let actual = crc32(&bytes[..body_end]);
        if stored != actual {
            return Err(EngineError::InvalidModel(format!(
                "checksum mismatch (stored {:08x}, computed {:08x})",
                stored, actual
            )));
        }

        let header_end = PREFIX_LEN + header_len;
        let header: ModelHeader = serde_json::from_slice(&bytes[PREFIX_LEN..header_end])?;
        header.validate()?;

        Ok(Self {
            header,
            weights: bytes[header_end..body_end].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)
            .map_err(|e| EngineError::InvalidModel(format!("failed to encode header: {}", e)))?;
        let header_len =
            u32::try_from(header.len()).map_err(|_| EngineError::InvalidModel("header too large".into()))?;

        let mut bytes = Vec::with_capacity(PREFIX_LEN + header.len() + self.weights.len() + CHECKSUM_LEN);
        write_prefix(&mut bytes, header_len, self.weights.len() as u64)
            .map_err(|e| EngineError::InvalidModel(format!("failed to encode prefix: {}", e)))?;
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&self.weights);

        let mut hasher = Crc32::new();
        hasher.update(&bytes);
        bytes
            .write_u32::<LittleEndian>(hasher.finalize())
            .map_err(|e| EngineError::InvalidModel(format!("failed to encode checksum: {}", e)))?;
        Ok(bytes)
    }

    pub fn write_to_path(&self, path: &Path) -> EngineResult<()> {
        let bytes = self.to_bytes()?;
        let mut file = std::fs::File::create(path).map_err(|e| {
            EngineError::InvalidModel(format!("failed to create '{}': {}", path.display(), e))
        })?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::InvalidModel(format!("failed to write '{}': {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "model artifact written");
        Ok(())
    }
}

fn write_prefix<W: Write>(writer: &mut W, header_len: u32, weights_len: u64) -> std::io::Result<()> {
    writer.write_all(&MAGIC)?;
    writer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    writer.write_u16::<LittleEndian>(0)?;
    writer.write_u32::<LittleEndian>(header_len)?;
    writer.write_u64::<LittleEndian>(weights_len)
}
