use std::{fmt::Display, path::Path};

use anyhow::{Context, anyhow, bail};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Encoded audio payload of a song, usually a base64 `data:` URI.
///
/// The store treats it as opaque text; only the upload and playback side
/// look inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioBlob(pub String);

/// Raw audio recovered from a blob
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedAudio {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AudioBlob {
    pub fn from_bytes(bytes: &[u8], mime: &str) -> Self {
        Self(format!(
            "data:{mime};base64,{}",
            general_purpose::STANDARD.encode(bytes)
        ))
    }

    /// Reads an audio file into a data URI, guessing the MIME type from the
    /// file extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read audio file {}", path.display()))?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::from_bytes(&bytes, mime.essence_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn decode(&self) -> anyhow::Result<DecodedAudio> {
        let rest = self
            .0
            .strip_prefix("data:")
            .ok_or(anyhow!("audio blob is not a data URI"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(anyhow!("audio data URI has no payload"))?;

        let Some(mime) = header.strip_suffix(";base64") else {
            bail!("only base64 data URIs are supported, got header '{header}'");
        };

        let bytes = general_purpose::STANDARD
            .decode(payload)
            .with_context(|| "failed to decode base64 audio payload")?;

        Ok(DecodedAudio {
            mime: mime.to_string(),
            bytes,
        })
    }
}

impl From<String> for AudioBlob {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for AudioBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // payloads run to megabytes, show only the header
        match self.0.split_once(',') {
            Some((header, payload)) => write!(f, "{header},<{} bytes>", payload.len()),
            None => write!(f, "<{} bytes>", self.0.len()),
        }
    }
}
