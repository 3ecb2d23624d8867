use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::error::KtError;
use crate::inference;
use crate::models::weights::ModelBundle;
use crate::protocol::*;
use crate::transport::NdjsonTransport;

// ── Server configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_name: String,
    pub server_version: String,
    pub default_top_n: usize,
}

// ── Recommendation server ─────────────────────────────────────────────────

/// JSON-RPC front end over a loaded model bundle.
///
/// The bundle is shared read-only; each request is answered independently.
pub struct RecommendServer<W: Write = std::io::Stdout> {
    config: ServerConfig,
    bundle: Arc<ModelBundle>,
    transport: NdjsonTransport<W>,
}

impl<W: Write> RecommendServer<W> {
    pub fn new(config: ServerConfig, bundle: Arc<ModelBundle>, transport: NdjsonTransport<W>) -> Self {
        Self {
            config,
            bundle,
            transport,
        }
    }

    pub fn into_transport(self) -> NdjsonTransport<W> {
        self.transport
    }

    /// Main loop: read one request per line until EOF.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line_result in reader.lines() {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let msg: JsonRpcIncoming = match serde_json::from_str(trimmed) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Parse error: {}", e);
                    self.transport
                        .write_error(0, PARSE_ERROR, "Parse error: invalid JSON", None);
                    continue;
                }
            };

            self.handle_message(msg);
        }

        Ok(())
    }

    fn handle_message(&mut self, msg: JsonRpcIncoming) {
        // Notifications carry no id and never get a reply.
        let Some(id) = msg.id else {
            tracing::debug!(method = ?msg.method, "Ignoring notification");
            return;
        };
        if msg.jsonrpc != "2.0" {
            self.transport.write_error(
                id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", msg.jsonrpc),
                None,
            );
            return;
        }
        let Some(method) = msg.method else {
            return;
        };
        tracing::debug!(id, method = %method, "Request received");

        let outcome = match method.as_str() {
            "initialize" => self.handle_initialize(),
            "recommend" => parse_params(msg.params).and_then(|p| {
                let result = inference::run_recommendation(&self.bundle, p, self.config.default_top_n)?;
                Ok(serde_json::to_value(result)?)
            }),
            "evaluate" => parse_params(msg.params).and_then(|p| {
                let result = inference::run_evaluation(&self.bundle, &p)?;
                Ok(serde_json::to_value(result)?)
            }),
            _ => {
                self.transport
                    .write_error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method), None);
                return;
            }
        };

        match outcome {
            Ok(result) => self.transport.write_response(id, result),
            Err(e) => {
                let code = error_code(&e);
                if code == INTERNAL_ERROR {
                    tracing::error!(method = %method, error = %e, "Request failed");
                } else {
                    tracing::warn!(method = %method, error = %e, "Rejected request");
                }
                self.transport
                    .write_error(id, code, e.to_string(), Some(e.to_json_rpc_data()));
            }
        }
    }

    fn handle_initialize(&self) -> crate::error::Result<serde_json::Value> {
        let result = InitializeResult {
            server_name: self.config.server_name.clone(),
            server_version: self.config.server_version.clone(),
            model: ModelInfo::from(self.bundle.model.config()),
        };
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> crate::error::Result<T> {
    let value = params.ok_or_else(|| KtError::Protocol("missing params".into()))?;
    serde_json::from_value(value).map_err(|e| KtError::Protocol(format!("invalid params: {e}")))
}

/// Caller mistakes map to invalid params; everything else is internal.
fn error_code(e: &KtError) -> i32 {
    match e {
        KtError::UnknownItem(_)
        | KtError::InvalidCode(_)
        | KtError::ShapeMismatch { .. }
        | KtError::InvalidConfig(_)
        | KtError::Protocol(_) => INVALID_PARAMS,
        KtError::IncompatibleWeights(_)
        | KtError::Io(_)
        | KtError::Json(_)
        | KtError::Candle(_)
        | KtError::Hub(_) => INTERNAL_ERROR,
    }
}
