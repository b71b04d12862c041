use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use color_eyre::eyre::Context;
use hyper::Method;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    utils::state::AppState,
    web::handlers::{
        get_credential, get_credential_status, get_page_stats, get_slot_owner, get_status_list,
        get_transactions, search_ledger, update_status,
    },
};

async fn health_check() -> impl IntoResponse {
    "OK"
}

pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn new(config: &Config, state: AppState) -> color_eyre::Result<Self> {
        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self {
            router: app(state),
            listener,
        })
    }

    pub async fn run(self) -> color_eyre::Result<()> {
        tracing::info!("listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .await
            .wrap_err("Failed to start HTTP server")?;
        Ok(())
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/statuslists", status_list_routes())
        .nest("/credentials", credential_routes())
        .route("/ledger/search", post(search_ledger))
        .route("/transactions", get(get_transactions))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .with_state(state)
}

fn status_list_routes() -> Router<AppState> {
    Router::new()
        .route("/{page_id}", get(get_status_list))
        .route("/{page_id}/stats", get(get_page_stats))
        .route("/{page_id}/{index}", get(get_slot_owner))
}

fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/status", post(update_status))
        .route("/{credential_id}", get(get_credential))
        .route("/{credential_id}/status/{purpose}", get(get_credential_status))
}
