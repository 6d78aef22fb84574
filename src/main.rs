use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use license_server::config::Config;
use license_server::email::EmailService;
use license_server::handlers;
use license_server::licensing::Licensor;
use license_server::payments::StripeClient;
use license_server::signing::Signer;
use license_server::state::AppState;
use license_server::store::{DocumentStore, LicenseStore, MemoryStore, SqliteStore};
use license_server::util::SystemClock;

#[derive(Parser, Debug)]
#[command(name = "license-server")]
#[command(about = "Trial, license and purchase issuance with offline-verifiable licenses")]
struct Cli {
    /// Print the base64 public key for SIGNING_KEY and exit
    #[arg(long)]
    public_key: bool,

    /// Keep documents in memory instead of DATABASE_PATH (data is lost on exit)
    #[arg(long)]
    in_memory: bool,
}

/// Print the verifying key clients should embed. Needs only SIGNING_KEY.
fn print_public_key() {
    dotenvy::dotenv().ok();
    let encoded = std::env::var("SIGNING_KEY").unwrap_or_else(|_| {
        eprintln!("SIGNING_KEY must be set");
        std::process::exit(1);
    });
    match Signer::from_base64(&encoded) {
        Ok(signer) => println!("{}", signer.public_key_base64()),
        Err(e) => {
            eprintln!("Invalid SIGNING_KEY: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.public_key {
        print_public_key();
        return;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "license_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!("Configuration error: {}", e);
        std::process::exit(1);
    });

    let backend: Arc<dyn DocumentStore> = if cli.in_memory {
        tracing::warn!("IN-MEMORY MODE: documents are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&config.database_path).unwrap_or_else(|e| {
            tracing::error!("Failed to open {}: {}", config.database_path, e);
            std::process::exit(1);
        }))
    };

    let stripe = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_webhook_secret.clone(),
    ));

    let licensor = Licensor::new(
        LicenseStore::new(backend, config.store_max_attempts),
        config.signer.clone(),
        stripe.clone(),
        Arc::new(EmailService::new(config.resend_api_key.clone())),
        Arc::new(SystemClock),
        config.policy.clone(),
    );

    tracing::info!(
        product_id = %config.policy.product_id,
        public_key = %config.signer.public_key_base64(),
        "Licensing ready"
    );

    let state = AppState {
        licensor: Arc::new(licensor),
        stripe,
    };

    let app = Router::new()
        .merge(handlers::public::router(config.rate_limit))
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("License server listening on {}", addr);

    // Peer address is needed for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
