//! Local IPC server for `compliance-gate-ctl` and co-located callers.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON requests and
//! routes them to the [`ComplianceEngine`].
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "evaluate_log", "payload": {"log": {"language": "java", "message": "..."}}}
//! {"command": "evaluate_artifacts", "artifacts": [{"type": "terraform", "name": "sg", "content": {}}]}
//! {"command": "reload"}
//! {"command": "status"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown command: x"}
//! ```

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::engine::ComplianceEngine;
use crate::models::artifact::Artifact;
use crate::models::payload::LogPayload;
use crate::{AppError, Result};

/// Inbound IPC request.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Log payload (for `evaluate_log`).
    payload: Option<Value>,
    /// Artifact list, or `{"artifacts": [...]}` (for `evaluate_artifacts`).
    artifacts: Option<Value>,
}

/// Outbound IPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self::error(format!("serialization failed: {err}")),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    engine: ComplianceEngine,
    name: String,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, engine.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, engine: ComplianceEngine) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = handle_line(&engine, trimmed).await;
                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Parse and dispatch one request line.
pub async fn handle_line(engine: &ComplianceEngine, line: &str) -> IpcResponse {
    match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => {
            let span = info_span!("ipc_command", command = %request.command);
            dispatch_command(request, engine).instrument(span).await
        }
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    }
}

/// Route an IPC command to the engine.
async fn dispatch_command(request: IpcRequest, engine: &ComplianceEngine) -> IpcResponse {
    match request.command.as_str() {
        "evaluate_log" => {
            let raw = request.payload.unwrap_or(Value::Null);
            IpcResponse::success(engine.evaluate_log(&LogPayload::from_request(&raw)))
        }
        "evaluate_artifacts" => match parse_artifacts(request.artifacts) {
            Ok(artifacts) => IpcResponse::success(engine.evaluate_artifacts(&artifacts)),
            Err(err) => IpcResponse::error(err),
        },
        "reload" => IpcResponse::success(engine.reload().await),
        "status" => IpcResponse::success(engine.status()),
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}

/// Accept a bare artifact list or an `{"artifacts": [...]}` wrapper.
fn parse_artifacts(raw: Option<Value>) -> std::result::Result<Vec<Artifact>, String> {
    let list = match raw {
        Some(Value::Object(mut map)) => map.remove("artifacts").unwrap_or(Value::Null),
        Some(other) => other,
        None => return Err("missing required 'artifacts' field".into()),
    };
    serde_json::from_value(list).map_err(|err| format!("invalid artifacts: {err}"))
}
