use std::sync::Arc;

use soundtab_daemon::bridge::NativeBridge;
use soundtab_daemon::core::{DaemonCore, DaemonEvent};
use soundtab_daemon::{http, logging, socket};
use soundtab_proto::config::Config;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Event channel first so the log layer can forward into it.
    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(256);

    // stdout carries native messages, so logs only go to the file.
    let data_dir = soundtab_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    logging::init(&log_path, event_tx.clone())?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let bridge = NativeBridge::spawn(
        tokio::io::stdin(),
        tokio::io::stdout(),
        event_tx.clone(),
        config.host.page_timeout(),
    );
    let mut daemon_core = DaemonCore::new(config.clone(), Arc::new(bridge), event_tx.clone());

    let listener = socket::bind(&config.popup.bind_address, config.popup.port).await?;
    let _socket_handle = socket::start_server(listener, event_tx.clone());

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            event_tx.clone(),
        );
    }

    daemon_core.initialize().await;

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
