use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use parley_core::tracing::init_tracing;
use parley_verification::config::VerificationConfig;
use parley_verification::infra::db::DbRegistrationStore;
use parley_verification::infra::fetcher::HttpProfileFetcher;
use parley_verification::infra::mailer::HttpMailer;
use parley_verification::router::build_router;
use parley_verification::state::AppState;
use parley_verification::worker::dispatcher::Dispatcher;
use parley_verification::worker::matcher::Matcher;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = VerificationConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = DbRegistrationStore { db };

    let fetcher = HttpProfileFetcher::new(
        config.fetch_timeout(),
        config.github_api_url.clone(),
        config.v2ex_api_url.clone(),
    )
    .expect("failed to build profile fetcher");

    let mailer = HttpMailer::new(
        config.fetch_timeout(),
        config.mail_api_url.clone(),
        config.mail_api_key.clone(),
        config.mail_sender.clone(),
    )
    .expect("failed to build mailer");

    let matcher = Matcher::new(store.clone(), fetcher, config.matcher_settings());
    let matcher_stats = matcher.stats();
    let dispatcher = Dispatcher::new(store.clone(), mailer, config.dispatcher_settings());
    let dispatcher_stats = dispatcher.stats();

    let matcher_handle = matcher.start();
    let dispatcher_handle = dispatcher.start();

    let router = build_router(AppState {
        store,
        matcher_stats,
        dispatcher_stats,
    });
    let addr = format!("0.0.0.0:{}", config.verification_port);
    let listener = TcpListener::bind(&addr).await.expect("failed to bind");

    info!("verification service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Drain both workers so every lease is released before exit.
    matcher_handle.stop().await;
    dispatcher_handle.stop().await;
}

async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received SIGINT, shutting down"); }
        _ = terminate => { info!("received SIGTERM, shutting down"); }
    }
}
