use thiserror::Error;

/// Errors from decoding or encoding source artifacts.
///
/// Every decode error aborts the whole artifact: no partial manifest is ever
/// produced.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A depot manifest violated the wire schema or the layout rules.
    #[error("malformed manifest ({}): {field}: {reason}", .file.as_deref().unwrap_or("<manifest>"))]
    MalformedManifest {
        /// Path of the offending file entry, if the problem is file-scoped.
        file: Option<String>,
        /// Name of the offending wire field.
        field: &'static str,
        reason: String,
    },

    /// A pack archive is structurally invalid.
    #[error("malformed pack at offset {offset}: {reason}")]
    MalformedPack { offset: u64, reason: String },

    /// A pack file record's embedded SHA-256 does not match its data.
    #[error("pack record checksum mismatch for {path}")]
    PackChecksumMismatch { path: String },

    /// Input cannot be represented in the target format.
    #[error("cannot encode: {0}")]
    Encode(String),

    /// A pack skeleton could not be serialized or deserialized.
    #[error("skeleton serialization error: {0}")]
    Serialization(String),
}

impl CodecError {
    pub(crate) fn manifest(
        file: Option<&str>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedManifest {
            file: file.map(str::to_owned),
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn pack(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedPack {
            offset,
            reason: reason.into(),
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
