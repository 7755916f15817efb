use gatehouse::api;
use gatehouse::logger::*;
use gatehouse::server::*;
use gatehouse::settings::*;
use std::fs;
use std::sync::Arc;
use tokio::signal;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let address: std::net::SocketAddr = project_settings.http.address.parse()?;
    let tls = match (&project_settings.http.cert_path, &project_settings.http.key_path) {
        (Some(cert_path), Some(key_path)) => {
            for path in [cert_path, key_path] {
                if !fs::metadata(path)?.is_file() {
                    return Err(anyhow::anyhow!("TLS file is not a regular file: {:?}", path));
                }
            }
            Some((cert_path.clone(), key_path.clone()))
        }
        (None, None) => None,
        _ => {
            return Err(anyhow::anyhow!(
                "http.cert_path and http.key_path must be set together"
            ));
        }
    };

    let server = Arc::new(Server::try_new(&project_settings).await?);

    #[cfg(unix)]
    spawn_reload_on_hangup(server.clone(), cli.settings.clone());

    let api_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error);

    match tls {
        Some((cert_path, key_path)) => {
            info!("listening on https://{}", address);
            warp::serve(api_v1)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown_signal())
                .1
                .await;
        }
        None => {
            warn!("listening on http://{} without TLS", address);
            let (_, serving) =
                warp::serve(api_v1).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
            serving.await;
        }
    }

    let shutdown_timeout = std::time::Duration::from_secs(100);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => info!("server shutdown successfully"),
        Err(_) => error!("server shutdown timed out"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("could not register SIGINT handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// SIGHUP re-reads the settings file and swaps in its webhook secrets.
#[cfg(unix)]
fn spawn_reload_on_hangup(server: Arc<Server>, settings_path: Option<String>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("could not register SIGHUP handler: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match parse_settings(settings_path.as_deref()) {
                Ok(settings) if settings.webhook.secrets.iter().any(|s| !s.is_empty()) => {
                    let count = settings.webhook.secrets.len();
                    server.rotate_webhook_secrets(settings.webhook.secrets);
                    info!(secrets = count, "webhook secrets reloaded");
                }
                Ok(_) => warn!("reloaded settings carry no webhook secret, keeping current ones"),
                Err(e) => error!("settings reload failed: {}", e),
            }
        }
    });
}
