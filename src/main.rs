use std::future::IntoFuture;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;

use wonderland::config::Config;
use wonderland::server::{AppState, build_router, build_static_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env from the binary's directory, then the cargo project root
    // (target/release/../..), then dotenvy's default CWD search.
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.to_path_buf()));
    match exe_dir {
        Some(dir) if dir.join(".env").exists() => {
            dotenvy::from_path(dir.join(".env")).ok();
        }
        Some(dir) if dir.join("../../.env").exists() => {
            dotenvy::from_path(dir.join("../../.env")).ok();
        }
        _ => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("wonderland starting");

    let config = Config::from_env();
    tokio::fs::create_dir_all(&config.ai_photos_dir)
        .await
        .with_context(|| format!("creating {}", config.ai_photos_dir.display()))?;
    tokio::fs::create_dir_all(&config.original_photos_dir)
        .await
        .with_context(|| format!("creating {}", config.original_photos_dir.display()))?;

    let state = AppState::from_config(&config);
    let api = build_router(state, &config.ai_photos_dir, &config.cors_origins);

    let static_addr: SocketAddr = config
        .static_bind_addr
        .parse()
        .with_context(|| format!("invalid STATIC_BIND_ADDR {}", config.static_bind_addr))?;
    let static_router = build_static_router(&config.original_photos_dir, static_addr.port());

    let api_listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    let static_listener = TcpListener::bind(static_addr)
        .await
        .with_context(|| format!("binding {static_addr}"))?;

    tracing::info!(
        api = %config.bind_addr,
        static_files = %static_addr,
        mock_mode = config.mock_mode(),
        "listening"
    );

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("wonderland shutting down");
    };

    tokio::select! {
        result = axum::serve(api_listener, api).into_future() => {
            result.inspect_err(|e| tracing::error!("api server error: {e:?}"))?;
        }
        result = axum::serve(static_listener, static_router).into_future() => {
            result.inspect_err(|e| tracing::error!("static server error: {e:?}"))?;
        }
        _ = shutdown => {}
    }

    Ok(())
}
