use hello_university::{
    auth,
    config::session::{validate_production_config, SessionConfig},
    db, handlers,
    repositories::user_repository::SqliteUserRepository,
    services::{
        auth_service::AuthService, email_service::create_email_gateway,
        user_service::UserService, verification_service::VerificationService,
    },
    AppState,
};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::{env, net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hello_university=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let pool = db::create_pool().await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("✓ database connected");

    // Repositories and services
    let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let user_service = Arc::new(UserService::new(user_repository.clone()));
    let auth_service = Arc::new(AuthService::new(user_repository.clone()));

    let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let email_gateway = Arc::new(create_email_gateway());
    let verification_service = Arc::new(VerificationService::new(
        user_repository,
        email_gateway,
        base_url,
    ));

    let app_state = AppState {
        user_service,
        auth_service,
        verification_service,
        pool: pool.clone(),
    };

    // Session store
    validate_production_config();
    let session_store = SqliteStore::new(pool.clone())
        .with_table_name("sessions")
        .expect("Invalid session table name for sessions");
    session_store.migrate().await?;

    let session_layer = SessionConfig::from_env().create_layer(session_store);

    // Login/signup pages bounce already-authenticated visitors to the
    // dashboard.
    let guest_routes = Router::new()
        .route(
            "/login",
            get(auth::handlers::login_page).post(auth::handlers::login_handler),
        )
        .route(
            "/signup",
            get(auth::handlers::signup_page).post(auth::handlers::signup_handler),
        )
        .layer(middleware::from_fn(
            auth::middleware::redirect_if_authenticated,
        ));

    let protected_routes = Router::new()
        .route("/dashboard", get(handlers::dashboard_handler))
        .layer(middleware::from_fn(auth::middleware::require_auth));

    let admin_routes = Router::new()
        .route("/admin/users", get(handlers::list_users_handler))
        .route("/admin/users/{id}", get(handlers::user_detail_handler))
        .route(
            "/admin/users/{id}/toggle-admin",
            post(handlers::toggle_admin_handler),
        )
        .route(
            "/admin/users/{id}/delete",
            post(handlers::delete_user_handler),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::middleware::require_admin,
        ));

    let app = Router::new()
        .route("/", get(handlers::index_handler))
        .route("/logout", get(auth::handlers::logout_handler))
        .route(
            "/verify-email/{token}",
            get(handlers::verify_email_handler),
        )
        .route("/verify-account", get(handlers::verify_account_page))
        .route(
            "/request-verification",
            post(handlers::request_verification_handler),
        )
        .merge(guest_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .nest_service("/static", ServeDir::new("static"))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("✓ server running at http://localhost:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
