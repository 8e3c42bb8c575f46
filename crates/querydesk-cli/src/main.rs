//! QueryDesk CLI - issue authenticated requests against the QueryDesk API.
//!
//! The session itself is created elsewhere (web login); this tool reuses the
//! stored tokens, refreshing them as needed.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use querydesk_core::api::OutboundRequest;
use querydesk_core::auth::{Credential, CredentialStore};
use querydesk_core::{ApiClient, ApiError, Config, SessionEvent};
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name prefix when file logging is enabled
const LOG_FILE_NAME: &str = "querydesk.log";

const USAGE: &str = "\
Usage: querydesk <command> [args]

Commands:
  get <path>                 GET a protected resource
  delete <path>              DELETE a protected resource
  post <path> <json>         POST a JSON body
  put <path> <json>          PUT a JSON body
  patch <path> <json>        PATCH a JSON body
  status                     Show whether a session is stored
  import-session <access> <refresh>
                             Store tokens from an existing session
  logout                     Clear the stored session";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level; set QUERYDESK_LOG_DIR to also log to a
/// daily-rotated file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("QUERYDESK_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    /// Unknown command or wrong arguments
    Usage,
}

/// Exit status for a usage error
const EXIT_USAGE: u8 = 2;

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => ExitCode::SUCCESS,
            Outcome::Usage => ExitCode::from(EXIT_USAGE),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    // Returning (rather than exiting) lets the guard flush the file log
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match start(&args).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(api_err) => eprintln!("Error: {}", api_err.user_message()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn start(args: &[String]) -> Result<Outcome> {
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(Outcome::Usage);
    };

    let config = Config::load().context("Failed to load configuration")?;
    let storage = config
        .open_storage()
        .context("Failed to open credential storage")?;
    let store = CredentialStore::shared(storage)?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let client = ApiClient::new(&config, Arc::clone(&store), Arc::new(events_tx))?;
    info!(base_url = client.base_url(), command, "QueryDesk CLI starting");

    let result = run(command, &args[1..], &client, &store).await;

    while let Ok(SessionEvent::LoggedOut { redirect_to }) = events_rx.try_recv() {
        eprintln!("Session ended. Sign in again at {}{}", config.api_origin, redirect_to);
    }
    result
}

async fn run(
    command: &str,
    args: &[String],
    client: &ApiClient,
    store: &CredentialStore,
) -> Result<Outcome> {
    match (command, args) {
        ("get", [path]) => print_response(client, OutboundRequest::get(path)).await,
        ("delete", [path]) => print_response(client, OutboundRequest::delete(path)).await,
        ("post", [path, body]) => {
            print_response(client, OutboundRequest::post(path).with_json(&parse_body(body)?)?).await
        }
        ("put", [path, body]) => {
            print_response(client, OutboundRequest::put(path).with_json(&parse_body(body)?)?).await
        }
        ("patch", [path, body]) => {
            print_response(client, OutboundRequest::patch(path).with_json(&parse_body(body)?)?).await
        }
        ("status", []) => {
            if store.is_authenticated() {
                println!("Signed in ({})", client.base_url());
            } else {
                println!("Not signed in");
            }
            Ok(Outcome::Done)
        }
        ("import-session", [access, refresh]) => {
            store.replace(Credential::new(access.as_str(), refresh.as_str()))?;
            println!("Session stored");
            Ok(Outcome::Done)
        }
        ("logout", []) => {
            client.logout()?;
            println!("Signed out");
            Ok(Outcome::Done)
        }
        _ => {
            eprintln!("{}", USAGE);
            Ok(Outcome::Usage)
        }
    }
}

fn parse_body(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Request body is not valid JSON")
}

async fn print_response(client: &ApiClient, request: OutboundRequest) -> Result<Outcome> {
    let response = client.execute(request).await?;
    let body: serde_json::Value = response.json()?;
    if !body.is_null() {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(Outcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydesk_core::auth::{MemoryStorage, NoNavigation};

    fn client_with_memory_store() -> (ApiClient, Arc<CredentialStore>) {
        let store = CredentialStore::shared(Box::new(MemoryStorage::new())).unwrap();
        let config = Config {
            api_base_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config, Arc::clone(&store), Arc::new(NoNavigation)).unwrap();
        (client, store)
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_command_or_arity_is_usage_error() {
        let (client, store) = client_with_memory_store();
        let outcome = run("frobnicate", &[], &client, &store).await.unwrap();
        assert_eq!(outcome, Outcome::Usage);

        let outcome = run("get", &args(&["/a", "/b"]), &client, &store).await.unwrap();
        assert_eq!(outcome, Outcome::Usage);

        assert_eq!(start(&[]).await.unwrap(), Outcome::Usage);
    }

    #[tokio::test]
    async fn test_import_session_then_logout() {
        let (client, store) = client_with_memory_store();

        let outcome = run("import-session", &args(&["A1", "R1"]), &client, &store)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(store.credential(), Some(Credential::new("A1", "R1")));

        assert_eq!(run("status", &[], &client, &store).await.unwrap(), Outcome::Done);

        assert_eq!(run("logout", &[], &client, &store).await.unwrap(), Outcome::Done);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_command_failures_are_errors_not_usage() {
        let (client, store) = client_with_memory_store();

        let bad_body = run("post", &args(&["/queries", "{not json"]), &client, &store).await;
        assert!(bad_body.is_err());

        // No session stored, so nothing is sent
        let err = run("get", &args(&["/queries"]), &client, &store)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>(), Some(&ApiError::MissingCredential));
    }
}
