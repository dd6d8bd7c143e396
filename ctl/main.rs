#![forbid(unsafe_code)]

//! `compliance-gate-ctl` — local CLI companion for `compliance-gate`.
//!
//! Connects to the IPC socket and sends JSON requests to the daemon.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "compliance-gate-ctl",
    about = "Local CLI for the compliance-gate daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc_name` config).
    #[arg(long, default_value = "compliance-gate")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the published snapshot and the last sync outcome.
    Status,

    /// Force a synchronous rule reload.
    Reload,

    /// Evaluate a log/response payload read from a JSON file.
    EvaluateLog {
        /// Path to the payload JSON (`-` for stdin).
        file: PathBuf,
    },

    /// Evaluate artifacts read from a JSON file (list or `{"artifacts": [...]}`).
    EvaluateArtifacts {
        /// Path to the artifacts JSON (`-` for stdin).
        file: PathBuf,
    },
}

fn main() {
    let args = Cli::parse();

    let request_json = match build_request(&args.command) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is compliance-gate running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

fn build_request(
    command: &Command,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(match command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Reload => serde_json::json!({ "command": "reload" }),
        Command::EvaluateLog { file } => {
            serde_json::json!({ "command": "evaluate_log", "payload": read_json(file)? })
        }
        Command::EvaluateArtifacts { file } => {
            serde_json::json!({ "command": "evaluate_artifacts", "artifacts": read_json(file)? })
        }
    })
}

fn read_json(
    path: &Path,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
