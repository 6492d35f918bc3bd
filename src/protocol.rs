//! JSON-RPC message types and LSP parameter builders.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for a method the client does not implement.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// A decoded inbound frame, classified by shape.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Reply to one of our requests.
    Response { id: u64, body: serde_json::Value },
    /// Request initiated by the engine; must be answered or the engine may
    /// block on it.
    EngineRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

/// Classify a frame. Returns `None` for shapes JSON-RPC does not define.
pub(crate) fn classify(frame: &serde_json::Value) -> Option<Inbound> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(serde_json::Value::as_str);
    let is_reply = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_reply) {
        (Some(id), None, true) => Some(Inbound::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(Inbound::EngineRequest {
            id: id.clone(),
            method: method.to_string(),
        }),
        (None, Some(method), _) => Some(Inbound::Notification {
            method: method.to_string(),
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

pub(crate) fn method_not_found_response(id: &serde_json::Value, method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("method not found: {method}")
        }
    })
}

pub(crate) fn initialize_params(root_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": { "name": "yaml-validator-client" },
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "publishDiagnostics": {
                    "relatedInformation": false
                }
            }
        }
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> serde_json::Value {
    // Full-content sync; the engine revalidates the whole document anyway.
    serde_json::json!({
        "textDocument": { "uri": uri, "version": version },
        "contentChanges": [{ "text": text }]
    })
}

pub(crate) fn did_close_params(uri: &str) -> serde_json::Value {
    serde_json::json!({ "textDocument": { "uri": uri } })
}

/// `textDocument/publishDiagnostics` payload. Diagnostics stay opaque —
/// they are routed by URI, never interpreted.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("cannot express {} as a file URI", path.display())]
pub(crate) struct PathToUriError {
    path: std::path::PathBuf,
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}
