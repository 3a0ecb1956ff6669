use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use cinelog::{AppState, config::Config, db, gateway::ResourceGateway, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,cinelog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let gateway = ResourceGateway::new(db.clone());

    let state = Arc::new(AppState { config: config.clone(), db, gateway });

    let app = Router::new()
        .route("/api/register", post(routes::register))
        .route("/api/login", post(routes::login))
        .route("/api/logout", post(routes::logout))
        .route("/api/users", get(routes::list_users))
        .route(
            "/api/users/{id}",
            get(routes::get_user).put(routes::update_user).delete(routes::delete_user),
        )
        .route("/api/users/{id}/profile", get(routes::profile))
        .route("/api/groups", get(routes::list_groups).post(routes::create_group))
        .route(
            "/api/groups/{id}",
            get(routes::get_group).put(routes::update_group).delete(routes::delete_group),
        )
        .route("/api/home", get(routes::home))
        .route("/api/movies", get(routes::catalog))
        .route("/api/movies/{id}", get(routes::movie_detail))
        .route("/api/movies/{id}/rating", post(routes::rate_movie))
        .route("/api/movies/{id}/favorite", post(routes::toggle_favorite))
        .route("/api/movies/{id}/review", post(routes::write_review))
        .route("/api/reviews/{id}", put(routes::edit_review).delete(routes::delete_review))
        .route("/api/moderation", get(routes::moderation_dashboard))
        .route("/api/moderation/users/{id}/toggle-active", post(routes::toggle_user_status))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
