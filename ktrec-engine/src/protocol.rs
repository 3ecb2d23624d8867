use serde::{Deserialize, Serialize};

use crate::dataset::{de_flag_list, de_id_list, Interaction};
use crate::models::ModelConfig;
use crate::recommend::Recommendation;

// ── JSON-RPC 2.0 error codes ──────────────────────────────────────────────

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// ── JSON-RPC 2.0 framing ──────────────────────────────────────────────────

/// Incoming JSON-RPC message. Only requests carry a method; anything
/// without one is ignored.
#[derive(Debug, Deserialize)]
pub struct JsonRpcIncoming {
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ── initialize ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub server_name: String,
    pub server_version: String,
    pub model: ModelInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub n_items: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub window_len: usize,
}

impl From<&ModelConfig> for ModelInfo {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_items: config.n_items,
            embed_dim: config.embed_dim,
            hidden_dim: config.hidden_dim,
            window_len: config.window_len,
        }
    }
}

// ── recommend ─────────────────────────────────────────────────────────────

/// A learner's chronologically ordered history. Item ids may be strings or
/// numbers; correctness may be booleans or 0/1.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendParams {
    #[serde(default)]
    pub learner_id: Option<String>,
    #[serde(deserialize_with = "de_id_list")]
    pub history_items: Vec<String>,
    #[serde(deserialize_with = "de_flag_list")]
    pub history_correct: Vec<bool>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learner_id: Option<String>,
    pub recommendations: Vec<Recommendation>,
}

// ── evaluate ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub min_interactions: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub k: usize,
    pub samples: usize,
    pub hits: usize,
    pub recall_at_k: f64,
    pub baseline_recall_at_k: f64,
}
