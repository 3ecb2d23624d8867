use thiserror::Error;

/// Typed error variants for the knowledge-tracing recommender.
#[derive(Debug, Error)]
pub enum KtError {
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Invalid item code: {0}")]
    InvalidCode(u32),

    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Incompatible weights: {0}")]
    IncompatibleWeights(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Hub error: {0}")]
    Hub(String),
}

impl KtError {
    /// Return a machine-readable error code string for this error variant.
    pub fn code(&self) -> &str {
        match self {
            Self::UnknownItem(_) => "UNKNOWN_ITEM",
            Self::InvalidCode(_) => "INVALID_CODE",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::IncompatibleWeights(_) => "INCOMPATIBLE_WEIGHTS",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Candle(_) => "CANDLE_ERROR",
            Self::Hub(_) => "HUB_ERROR",
        }
    }

    /// Build the `data` payload attached to JSON-RPC error responses.
    pub fn to_json_rpc_data(&self) -> serde_json::Value {
        serde_json::json!({
            "ktCode": self.code(),
            "message": self.to_string(),
        })
    }

    /// Check that a sequence dimension matches what the model was built for.
    pub fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::ShapeMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

pub type Result<T> = std::result::Result<T, KtError>;
