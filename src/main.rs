use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use localization::{
    configuration::Configuration, localize, session, Locales, Localization, PreferenceEndpoint,
    Translations,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn get_index_page(Locales(locales): Locales, translations: Translations) -> String {
    format!(
        "{} ({})",
        translations.translate("hello"),
        locales
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(", ")
    )
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let configuration = match Configuration::from_env() {
        Ok(configuration) => configuration,
        Err(error) => {
            tracing::error!("Invalid configuration: {error}");
            std::process::exit(1);
        }
    };

    let localization = Arc::new(Localization::new(configuration.translation()));

    let app = Router::new()
        .route("/", get(get_index_page))
        .merge(PreferenceEndpoint::default().router())
        .layer(middleware::from_fn_with_state(localization, localize))
        .layer(middleware::from_fn(session::manage))
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(configuration.bind_address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!("Failed to bind {}: {error}", configuration.bind_address);
            std::process::exit(1);
        }
    };

    tracing::info!("listening on http://{}", configuration.bind_address);
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!("Server error: {error}");
    }
}
