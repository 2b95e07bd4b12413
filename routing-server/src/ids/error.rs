//! Id store error types.

use std::path::PathBuf;

/// Errors from loading or writing an id store file.
///
/// All of these are fatal at startup: a store that fails to load is never
/// partially registered.
#[derive(Debug, thiserror::Error)]
pub enum IdStoreError {
    /// The file could not be read
    #[error("failed to read id store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record's length prefix is malformed or overruns the file
    #[error("malformed record framing at byte {offset}: {reason}")]
    Framing { offset: usize, reason: String },

    /// A record body is not a valid message
    #[error("invalid record at byte {offset}: {source}")]
    Message {
        offset: usize,
        #[source]
        source: prost::DecodeError,
    },

    /// A record names an entity kind outside the known enumeration
    #[error("unknown id type tag: {0}")]
    UnknownTypeTag(u64),

    /// An LZ4 payload could not be decompressed
    #[error("failed to decompress ids of type tag {tag}: {source}")]
    Decompress {
        tag: u64,
        #[source]
        source: std::io::Error,
    },

    /// An LZ4 payload could not be compressed
    #[error("failed to compress ids of type tag {tag}: {source}")]
    Compress {
        tag: u64,
        #[source]
        source: std::io::Error,
    },

    /// A string in the payload is malformed
    #[error("invalid string in payload of type tag {tag}: {reason}")]
    InvalidString { tag: u64, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = IdStoreError::UnknownTypeTag(99);
        assert_eq!(err.to_string(), "unknown id type tag: 99");

        let err = IdStoreError::Framing {
            offset: 12,
            reason: "truncated".into(),
        };
        assert_eq!(err.to_string(), "malformed record framing at byte 12: truncated");

        let err = IdStoreError::InvalidString {
            tag: 3,
            reason: "not UTF-8".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid string in payload of type tag 3: not UTF-8"
        );
    }
}
