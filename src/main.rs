use polling_relay::api;
use polling_relay::config::{Config, LogFormat};
use polling_relay::poll::PollServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("polling-relay: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log.format);

    let server = PollServer::start(config.poll.default_timeout());
    let routes = api::routes(server, &config.cors);

    let bound = warp::serve(routes).try_bind_with_graceful_shutdown(config.bind_address(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    });

    let (addr, serving) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind server address");
            std::process::exit(1);
        }
    };

    tracing::info!(
        %addr,
        allowed_origins = ?config.cors.allowed_origins,
        "Polling backend running"
    );
    serving.await;
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("polling_relay=info,warp=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
