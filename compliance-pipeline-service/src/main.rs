use compliance_pipeline_service::create_app;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "compliance_pipeline_service=debug,compliance_core=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app = match create_app() {
        Ok(app) => app,
        Err(e) => {
            error!("failed to initialize pipeline service: {e}");
            std::process::exit(1);
        }
    };

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8001".to_string())
        .parse::<u16>()
        .unwrap_or(8001);

    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("compliance pipeline service running on http://0.0.0.0:{port}");

    axum::serve(listener, app).await?;

    Ok(())
}
