use dotenvy::dotenv;
use estimator::configuration::Context;
use estimator::core::{AppState, HttpServer};
use estimator::database::DatabaseService;
use estimator::deepsearch::DeepSearchService;
use estimator::email::EmailService;
use estimator::AppError;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let context = Context::new("config.json").map_err(|e| AppError::ConfigError(e.to_string()))?;

    let log_level = Level::from_str(&context.config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .init();
    tracing::info!("Starting Estimator Application");

    let db = Arc::new(DatabaseService::new().map_err(|e| AppError::DatabaseError(e.to_string()))?);
    let deepsearch = Arc::new(
        DeepSearchService::new(&context.config.deepsearch)
            .map_err(|e| AppError::DeepSearchError(e.to_string()))?,
    );
    let email = Arc::new(EmailService::new(&context.config.email.service_url));

    let state = AppState::new(context, db, deepsearch, email);
    HttpServer::start(state)
        .await
        .map_err(|_| AppError::ServiceError)
}
