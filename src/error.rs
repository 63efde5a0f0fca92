use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    NotADirectory,
    NoMatches,
    IndexOutOfRange,
    Decode,
    Encode,
    Io,
    ToolMissing,
    ToolFailed,
    ToolTimeout,
    Json,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::NotADirectory => "not_a_directory",
            Self::NoMatches => "no_matches",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Io => "io",
            Self::ToolMissing => "tool_missing",
            Self::ToolFailed => "tool_failed",
            Self::ToolTimeout => "tool_timeout",
            Self::Json => "json",
            Self::Config => "config",
        }
    }
}

/// A tagged failure shared by every node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn io(context: &str, source: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("{context}: {source}"))
    }

    pub fn decode(path: &std::path::Path, source: &image::ImageError) -> Self {
        Self::new(
            ErrorKind::Decode,
            format!("failed to decode image '{}': {source}", path.display()),
        )
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encode, message)
    }

    pub fn json(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Json, message)
    }
}

/// What a node hands back to the host when it re-raises: the generic
/// host-facing message plus everything the debug log recorded up to the
/// failure.
#[derive(Debug, Clone, Error)]
#[error("{context}: {error}")]
pub struct NodeFailure {
    pub context: &'static str,
    #[source]
    pub error: NodeError,
    pub debug_log: String,
}

impl NodeFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind
    }
}

pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_carries_context_and_message() {
        let failure = NodeFailure {
            context: "Failed to save image with metadata",
            error: NodeError::new(ErrorKind::Io, "permission denied"),
            debug_log: String::from("log"),
        };
        assert_eq!(
            failure.to_string(),
            "Failed to save image with metadata: permission denied"
        );
        assert_eq!(failure.kind(), ErrorKind::Io);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let value = serde_json::to_value(ErrorKind::IndexOutOfRange).expect("kind should serialize");
        assert_eq!(value, serde_json::json!("index_out_of_range"));
        assert_eq!(ErrorKind::IndexOutOfRange.as_str(), "index_out_of_range");
    }
}
