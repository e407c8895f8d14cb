use std::net::SocketAddr;

use buckley_server::{app, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = buckley_observability::init();

    let config = Config::from_env();
    let addr: SocketAddr = config.coordinator.address.parse().expect("COORDINATOR_ADDRESS must be host:port");
    let tls_paths = config.tls_cert_path.clone().zip(config.tls_key_path.clone());

    let (router, _state, cancel) = app::build_app(config).await?;
    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

    match tls_paths {
        Some((cert_path, key_path)) => {
            tracing::info!(%addr, "listening with TLS");
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
            axum_server::bind_rustls(addr, tls_config).serve(make_service).await?;
        }
        None => {
            tracing::warn!(%addr, "TLS_CERT_PATH/TLS_KEY_PATH not set; serving plaintext (insecure-local only)");
            axum_server::bind(addr).serve(make_service).await?;
        }
    }

    cancel.cancel();
    Ok(())
}
