use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use mongodb::Client;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod auth;
mod balance;
mod config;
mod error;
mod gate;
mod memory_source;
mod mongo_source;
mod presentation;
mod routes;
mod schemas;
mod session;
mod store;

use crate::{
    auth::TokenAuth, config::Config, mongo_source::MongoDataSource, routes::AppState,
    schemas::default_categories, session::Sessions,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    if std::env::var("ENV").ok().as_deref() != Some("prod") {
        dotenvy::dotenv().ok();
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expense_manager=debug,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env().map_err(|err| {
        tracing::error!(%err, "invalid configuration");
        io::Error::new(io::ErrorKind::InvalidInput, err)
    })?;
    tracing::info!(database = %config.database, "connecting to MongoDB");

    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::ConnectionRefused, err))?;
    tracing::info!("connected");

    let state = web::Data::new(AppState::new(
        Arc::new(TokenAuth::new(config.auth_secret.clone())),
        Arc::new(MongoDataSource::new(&client, &config.database)),
        default_categories(),
        Sessions::new(
            chrono::Duration::minutes(i64::from(config.session_idle_minutes)),
            config.max_sessions,
        ),
    ));

    tracing::info!("listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
