pub mod cache;
pub mod config_paths;
pub mod error;
pub mod lookup;
pub mod session;
pub mod settings;
pub mod store;

use std::{process::ExitCode, sync::Arc};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::EnvFilter;

pub use error::{LookupError, Result};
pub use session::{Intent, Outcome, Session};
pub use settings::{S3Settings, StoreConfig};
pub use store::{FileEntry, Folder, ListObjects, ListPage, ListRequest, ObjectStore, PublicUrls};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderInput {
    folder: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInput {
    folder: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestInput {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlInput {
    key: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    id: Option<Value>,
    method: String,
    payload: Option<Value>,
}

/// Logs go to stderr; stdout carries responses only.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn payload_or_null(payload: Option<Value>) -> Value {
    payload.unwrap_or(Value::Null)
}

fn parse_payload<T>(payload: Value) -> std::result::Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(payload).map_err(|err| format!("Invalid payload: {err}"))
}

fn intent_for(method: &str, payload: Value) -> std::result::Result<Intent, String> {
    Ok(match method {
        "folders:list" => Intent::LoadFolders,
        "folders:refresh" => Intent::RefreshFolders,
        "files:list" => {
            let input: FolderInput = parse_payload(payload)?;
            Intent::SelectFolder {
                folder: input.folder,
            }
        }
        "files:search" => {
            let input: SearchInput = parse_payload(payload)?;
            Intent::Search {
                folder: input.folder,
                name: input.name,
            }
        }
        "files:find" => {
            let input: SearchInput = parse_payload(payload)?;
            Intent::FindExact {
                folder: input.folder,
                name: input.name,
            }
        }
        "files:suggest" => {
            let input: SuggestInput = parse_payload(payload)?;
            Intent::QueryChanged { text: input.text }
        }
        "url:public" => {
            let input: UrlInput = parse_payload(payload)?;
            Intent::PublicUrl { key: input.key }
        }
        _ => return Err(format!("Unknown method: {method}")),
    })
}

pub async fn rpc_request(
    session: &Session,
    method: &str,
    payload: Option<Value>,
) -> std::result::Result<Value, String> {
    let intent = intent_for(method, payload_or_null(payload))?;
    let outcome = session.dispatch(intent).await.map_err(|err| {
        if err.is_transient() {
            tracing::warn!(method, error = %err, "request did not complete");
        } else {
            tracing::error!(method, error = %err, "request failed");
        }
        err.to_string()
    })?;
    serde_json::to_value(outcome).map_err(|err| format!("Failed to encode response: {err}"))
}

fn response_line(id: Option<Value>, result: std::result::Result<Value, String>) -> Value {
    let mut line = match result {
        Ok(value) => json!({ "result": value }),
        Err(error) => json!({ "error": error }),
    };
    if let Some(id) = id {
        line["id"] = id;
    }
    line
}

/// Process exit status for an error that stops the binary.
pub fn exit_status(err: &LookupError) -> u8 {
    match err {
        LookupError::ConfigInvalid(_) => 2,
        _ => 1,
    }
}

pub fn open_session() -> Result<Session> {
    let config = S3Settings::load()?.validate()?;
    tracing::info!(endpoint = %config.endpoint, bucket = %config.bucket, "session opened");
    Ok(Session::new(ObjectStore::from_config(&config)))
}

async fn answer_line(session: &Session, line: &str) -> Value {
    match serde_json::from_str::<RpcEnvelope>(line) {
        Ok(envelope) => {
            let result = rpc_request(session, &envelope.method, envelope.payload).await;
            response_line(envelope.id, result)
        }
        Err(err) => response_line(None, Err(format!("Invalid request: {err}"))),
    }
}

/// Answers JSON-line requests from `input` on `output`.
///
/// Each request runs as its own task, so a request read later can supersede
/// a listing that is still in flight. Responses are written as they
/// complete and echo the request's `id`.
pub async fn serve_lines<R, W>(
    session: Arc<Session>,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let mut tx = Some(tx);
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => {
                let Some(line) = line? else {
                    tx = None;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(tx) = tx.as_ref() {
                    let tx = tx.clone();
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        let _ = tx.send(answer_line(&session, &line).await);
                    });
                }
            }
            Some(response) = rx.recv() => {
                output.write_all(format!("{response}\n").as_bytes()).await?;
                output.flush().await?;
            }
            else => break,
        }
    }
    Ok(())
}

async fn serve(args: Vec<String>) -> ExitCode {
    let session = match open_session() {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "cannot start");
            eprintln!("{err}");
            return ExitCode::from(exit_status(&err));
        }
    };

    let Some(method) = args.first() else {
        let input = BufReader::new(tokio::io::stdin());
        return match serve_lines(Arc::new(session), input, tokio::io::stdout()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(error = %err, "request stream failed");
                ExitCode::FAILURE
            }
        };
    };

    let payload = match args.get(1).map(|raw| serde_json::from_str::<Value>(raw)).transpose() {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("Invalid payload: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = rpc_request(&session, method, payload).await;
    let failed = result.is_err();
    println!("{}", response_line(None, result));
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

pub fn run() -> ExitCode {
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(std::env::args().skip(1).collect()))
}
