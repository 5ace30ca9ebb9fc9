use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use trading_analyzer::analysis::{AnalysisPipeline, OpenAiVisionClient};
use trading_analyzer::config::AppConfig;
use trading_analyzer::routes::{build_cors, configure_routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(format!("Configuration error: {}", e)));
        }
    };
    log::info!("Loaded configuration: {:?}", config);

    let client = OpenAiVisionClient::new(&config).map_err(|e| {
        log::error!("Failed to build vision API client: {}", e);
        std::io::Error::other(format!("HTTP client error: {}", e))
    })?;
    let pipeline = web::Data::new(AnalysisPipeline::new(&config, Arc::new(client)));

    if config.allows_any_origin() {
        log::warn!("CORS allows any origin. Set ALLOWED_ORIGINS to restrict it.");
    }

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let allowed_origins = config.allowed_origins.clone();
    let allow_any = config.allows_any_origin();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origins, allow_any))
            .wrap(Logger::default())
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
