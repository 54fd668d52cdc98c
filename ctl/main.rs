#![forbid(unsafe_code)]

//! `session-conductor-ctl` — local CLI companion for `session-conductor`.
//!
//! Connects to the IPC socket and sends JSON commands to the daemon.
//! The `watch` subcommand stays attached and prints every pushed session
//! event line until interrupted.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "session-conductor-ctl",
    about = "Local CLI for the session-conductor daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc_name` config).
    #[arg(long, default_value = "session-conductor")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a prompt to a session.
    Prompt {
        /// Target session identifier.
        session: String,
        /// Prompt text.
        text: String,
        /// Model selector forwarded to the backend.
        #[arg(long)]
        model: Option<String>,
        /// Permission mode forwarded to the backend.
        #[arg(long)]
        permission_mode: Option<String>,
    },

    /// Cancel a session's running task.
    Cancel {
        /// Target session identifier.
        session: String,
    },

    /// Show a session's task status and queue size.
    Status {
        /// Target session identifier.
        session: String,
    },

    /// List a session's queued prompts.
    Queue {
        /// Target session identifier.
        session: String,
    },

    /// Delete one queued prompt.
    QueueDelete {
        /// Target session identifier.
        session: String,
        /// Queued item identifier.
        item_id: String,
    },

    /// Clear a session's queue.
    QueueClear {
        /// Target session identifier.
        session: String,
    },

    /// Watch a session and print its event stream.
    Watch {
        /// Target session identifier.
        session: String,
    },
}

fn main() {
    let args = Cli::parse();

    let request_json = match &args.command {
        Command::Prompt {
            session,
            text,
            model,
            permission_mode,
        } => {
            let mut req = serde_json::json!({
                "command": "prompt",
                "session_id": session,
                "prompt": text,
            });
            let mut options = serde_json::Map::new();
            if let Some(m) = model {
                options.insert("model".into(), serde_json::Value::String(m.clone()));
            }
            if let Some(p) = permission_mode {
                options.insert("permission_mode".into(), serde_json::Value::String(p.clone()));
            }
            if !options.is_empty() {
                req["options"] = serde_json::Value::Object(options);
            }
            req
        }
        Command::Cancel { session } => {
            serde_json::json!({ "command": "cancel", "session_id": session })
        }
        Command::Status { session } => {
            serde_json::json!({ "command": "status", "session_id": session })
        }
        Command::Queue { session } => {
            serde_json::json!({ "command": "queue_list", "session_id": session })
        }
        Command::QueueDelete { session, item_id } => {
            serde_json::json!({ "command": "queue_delete", "session_id": session, "item_id": item_id })
        }
        Command::QueueClear { session } => {
            serde_json::json!({ "command": "queue_clear", "session_id": session })
        }
        Command::Watch { session } => {
            serde_json::json!({ "command": "watch", "session_id": session })
        }
    };

    let follow = matches!(args.command, Command::Watch { .. });

    match send_ipc_command(&args.ipc_name, &request_json, follow) {
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
            eprintln!("Is session-conductor running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
///
/// With `follow`, every subsequent pushed event line is printed as-is
/// until the daemon closes the stream; the first response line is still
/// returned to the caller for the usual ok/error rendering.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
    follow: bool,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    // Send request as a single JSON line.
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    // Read response line.
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;

    if follow {
        let mut event_line = String::new();
        loop {
            event_line.clear();
            if reader.read_line(&mut event_line)? == 0 {
                break;
            }
            print!("{event_line}");
        }
    }

    Ok(response)
}
