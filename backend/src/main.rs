use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use oncopredict::config::ServiceConfig;
use oncopredict::models::ModelRegistry;
use oncopredict::patients::PatientStore;
use oncopredict::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServiceConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {e}"))
    })?;

    // Missing models leave their endpoints answering 503; the server still starts.
    let registry = ModelRegistry::load(&config.models);
    let status = registry.status();
    if !(status.image && status.treatment && status.survival) {
        log::warn!("Starting with models unavailable: {:?}", status);
    }

    let store = PatientStore::open(config.patients.store_path.clone()).map_err(|e| {
        log::error!("Failed to open patient store: {}", e);
        std::io::Error::other(format!("Patient store error: {e}"))
    })?;

    let bind_address = config.bind_address();
    let registry = web::Data::new(registry);
    let store = web::Data::new(store);
    let config = web::Data::new(config);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .app_data(registry.clone())
            .app_data(store.clone())
            .app_data(config.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
