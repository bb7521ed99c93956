use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use marketplace_client::api::auth;
use marketplace_client::api::types::LoginRequest;
use marketplace_client::config::StoreKind;
use marketplace_client::session::storage;
use marketplace_client::{ApiClient, ClientConfig, ClientError, SessionWatcher};

#[derive(Parser, Debug)]
#[command(name = "marketplace-client", about = "Marketplace API client with automatic session renewal")]
struct Args {
    /// Override the API base URL (default: MARKETPLACE_API_URL > REACT_APP_API_URL > localhost)
    #[arg(long)]
    api_url: Option<String>,

    /// Session store: keychain, file or memory
    #[arg(long)]
    store: Option<StoreKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MARKETPLACE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the refresh token and forget the session
    Logout,
    /// Show the current session
    Status,
    /// Authenticated GET, printing the response body
    Get { path: String },
    /// End the session as soon as it expires, until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(store) = args.store {
        // `--store file` keeps a path set through MARKETPLACE_SESSION_FILE.
        let keeps_path = store == StoreKind::File(None)
            && matches!(config.store, StoreKind::File(Some(_)));
        if !keeps_path {
            config.store = store;
        }
    }
    log::info!("Marketplace client using {}", config.api_base_url);

    let client = ApiClient::new(&config, storage::open(&config.store)?)?;
    client.on_session_expired(|route| {
        eprintln!("Session ended. Sign in again at {}", route);
    });
    if client.restore_session().await? {
        log::debug!("Restored persisted session");
    }

    match args.command {
        Command::Login { email, password } => {
            let user = auth::login(&client, &LoginRequest { email, password }).await?;
            println!("Signed in as {}", user.display_name());
        }
        Command::Logout => {
            auth::logout(&client).await;
            println!("Signed out");
        }
        Command::Status => print_status(&client).await,
        Command::Get { path } => {
            let resp = client.authenticated_get(&path).await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(ClientError::Api { status, body });
            }
            println!("{}", body);
        }
        Command::Watch => watch(&client, &config).await,
    }
    Ok(())
}

async fn print_status(client: &ApiClient) {
    let tokens = client.tokens();
    match tokens.user().await {
        Some(user) => {
            println!("User:    {} <{}>", user.display_name(), user.email);
            match tokens.expires_at().await {
                Some(at) => println!("Expires: {}", at.to_rfc3339()),
                None => println!("Expires: unknown"),
            }
        }
        None => println!("Not signed in"),
    }
    println!("Refresh: {}", client.refresh_phase().label());
}

async fn watch(client: &ApiClient, config: &ClientConfig) {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let watcher = SessionWatcher::new(
        client.tokens().clone(),
        client.session_teardown().clone(),
        config.session_check_interval,
        shutdown_rx,
    );
    let handle = tokio::spawn(watcher.run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }
    let _ = shutdown_tx.send(()).await;
    if let Err(e) = handle.await {
        log::error!("Session watcher task failed: {}", e);
    }
}
