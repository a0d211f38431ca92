mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::{Compress, Logger, NormalizePath},
    web, App, HttpResponse, HttpServer,
};
use std::net::SocketAddr;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::db::Database;
use crate::error::AppResult;
use crate::middleware::SecurityHeaders;
use crate::routes::create_routes;
use crate::services::{TokenService, UserService};

/// Shared, read-only state handed to every worker.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub tokens: TokenService,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting notes backend");

    let config = Config::from_env().map_err(anyhow::Error::msg)?;
    info!("Configuration loaded from environment");

    if config.uses_fallback_secret() {
        warn!("AUTH_ENCRYPTION_KEY is not set; sessions are signed with the built-in fallback secret");
    }
    if config.cors_allow_origin == "*" {
        warn!("CORS_BASE_URL is not set; every origin is allowed");
    }

    std::fs::create_dir_all(config.database_dir())?;
    let db = Database::new(&config).await?;
    info!("Database connected");

    db.run_migrations().await?;
    info!("Database migrations completed");

    if config.no_auth_for_user_zero {
        warn!("NO_AUTH_FOR_USER_ZERO is enabled: authentication is OFF and every request acts as admin user 0");
        UserService::new(&db).ensure_operator().await?;
    }

    let state = web::Data::new(AppState {
        db: db.clone(),
        tokens: TokenService::new(&config.jwt_secret),
        config: config.clone(),
    });

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let cors_allow_origin = config.cors_allow_origin.clone();

    info!("Server running at http://{}", addr);

    HttpServer::new(move || {
        // Credentialed requests cannot use a literal `*`, so echo the origin back instead
        let cors = if cors_allow_origin == "*" {
            Cors::default()
                .allowed_origin_fn(|_origin, _req_head| true)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
                .max_age(3600)
        } else {
            let mut cors = Cors::default();
            for origin in cors_allow_origin.split(',').map(|s| s.trim()) {
                cors = cors.allowed_origin(origin);
            }
            cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"])
                .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
                .supports_credentials()
                .max_age(3600)
        };

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Compress::default())
            .wrap(Logger::default())
            .wrap(SecurityHeaders)
            .wrap(NormalizePath::trim())
            .configure(configure_app)
    })
    .bind(addr)?
    .run()
    .await?;

    // Server has drained; flush the WAL before exit
    db.shutdown().await;

    Ok(())
}

/// Routes shared by the server and the test harness.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/health/db", web::get().to(health_check_db))
        .service(web::scope("/api").configure(create_routes));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": true }))
}

async fn health_check_db(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.db.ping().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": true })))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::utils::auth::SESSION_COOKIE;
    use actix_web::cookie::Cookie;

    pub const TEST_SECRET: &str = "test-secret";

    /// Builds the full app over `$state`, the same way `main` does minus CORS.
    macro_rules! init_app {
        ($state:expr) => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data($state.clone())
                    .wrap(crate::middleware::SecurityHeaders)
                    .wrap(actix_web::middleware::NormalizePath::trim())
                    .configure(crate::configure_app),
            )
            .await
        };
    }
    pub(crate) use init_app;

    pub async fn test_state_with(config: Config) -> web::Data<AppState> {
        let db = Database::in_memory().await.unwrap();
        if config.no_auth_for_user_zero {
            UserService::new(&db).ensure_operator().await.unwrap();
        }

        web::Data::new(AppState {
            db,
            tokens: TokenService::new(&config.jwt_secret),
            config,
        })
    }

    pub async fn test_state() -> web::Data<AppState> {
        test_state_with(Config {
            jwt_secret: TEST_SECRET.to_string(),
            ..Config::default()
        })
        .await
    }

    /// Registers `username` and returns a session cookie for it.
    pub async fn session_for(state: &web::Data<AppState>, username: &str) -> Cookie<'static> {
        let user = UserService::new(&state.db)
            .register(username, &format!("{}@example.com", username), "pw")
            .await
            .unwrap();
        let token = state
            .tokens
            .issue(user.id, &user.username, user.is_admin)
            .unwrap();
        Cookie::new(SESSION_COOKIE, token)
    }

    #[actix_web::test]
    async fn test_health_endpoints() {
        let state = test_state().await;
        let app = init_app!(state);

        for uri in ["/health", "/health/db"] {
            let resp = actix_web::test::call_service(
                &app,
                actix_web::test::TestRequest::get().uri(uri).to_request(),
            )
            .await;
            assert!(resp.status().is_success());
        }
    }

    #[actix_web::test]
    async fn test_no_auth_mode_owns_notes_as_operator() {
        let state = test_state_with(Config {
            no_auth_for_user_zero: true,
            ..Config::default()
        })
        .await;
        let app = init_app!(state);

        let resp = actix_web::test::call_service(
            &app,
            actix_web::test::TestRequest::post()
                .uri("/api/notes")
                .set_json(serde_json::json!({ "title": "offline" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
        let note: serde_json::Value = actix_web::test::read_body_json(resp).await;
        assert_eq!(note["user_id"], 0);

        let resp = actix_web::test::call_service(
            &app,
            actix_web::test::TestRequest::get().uri("/api/users").to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
    }
}
