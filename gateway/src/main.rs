use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{env, thread};

use actix_web::rt::net::UdpSocket;
use anyhow::{anyhow, Result};
use log::{error, info};
use tokio::signal;

mod broker;
mod netmode;
mod relay;
mod settings;
mod telemetry;
mod web;

use broker::{BrokerLink, MqttTransport};
use netmode::{ModeResolution, NetworkMode};
use relay::RelayCoordinator;
use settings::SettingsStore;

/// The supervisor restarts the daemon on this exit code; used by `/reset`
/// and by the invalid-mode self-heal.
const RESTART_EXIT_CODE: i32 = 10;
const RECONNECT_PERIOD: Duration = Duration::from_secs(1);
const RELAY_QUEUE_DEPTH: usize = 64;

#[actix_web::main]
async fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut store = SettingsStore::load()?;
    let mode = match netmode::resolve_mode(&mut store)? {
        ModeResolution::Mode(mode) => mode,
        ModeResolution::RestartRequired => {
            error!("wifi mode was reset, restart required");
            std::process::exit(RESTART_EXIT_CODE);
        }
    };
    info!("network mode: {mode:?}");

    let store = Arc::new(Mutex::new(store));
    let link = Arc::new(Mutex::new(BrokerLink::new(MqttTransport::new())));

    // access-point mode has no uplink: the broker link stays unarmed and
    // publishes are skipped while it sits in Disconnected
    if mode == NetworkMode::Station {
        let mqtt = store
            .lock()
            .map_err(|_| anyhow!("settings store poisoned"))?
            .mqtt();
        let probe_addr = format!("{}:{}", mqtt.server, mqtt.port);
        let timeout = env::var("GATEWAY_UPLINK_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        let addr =
            tokio::task::spawn_blocking(move || netmode::connect_and_wait(&probe_addr, timeout))
                .await??;
        info!("station uplink up, local address {addr}");

        let link = link.clone();
        let store = store.clone();
        thread::spawn(move || loop {
            // settings are re-read every cycle so /save-mqtt changes are
            // picked up on the next reconnect
            let mqtt = match store.lock() {
                Ok(store) => store.mqtt(),
                Err(_) => break,
            };
            if let Ok(mut link) = link.lock() {
                let _ = link.ensure_connected(&mqtt);
            }
            thread::sleep(RECONNECT_PERIOD);
        });
    }

    let (coordinator, frames) = RelayCoordinator::new(RELAY_QUEUE_DEPTH);
    let _worker = relay::spawn_worker(frames, link.clone());

    let bind_addr = env::var("GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0:8989".to_string());
    let sock = UdpSocket::bind(&bind_addr).await?;
    info!("listening for sensor broadcasts on {bind_addr}");

    let ingress = actix_web::rt::spawn(async move {
        let mut buf = [0; 1024];
        loop {
            tokio::select! {
                Ok((len, _addr)) = sock.recv_from(&mut buf) => {
                    coordinator.on_frame_received(&buf[0..len]);
                }
                Ok(()) = signal::ctrl_c() => { break; }
            }
        }
    });

    let (restart_tx, mut restart_rx) = tokio::sync::mpsc::channel(1);
    actix_web::rt::spawn(async move {
        if restart_rx.recv().await.is_some() {
            info!("restarting");
            std::process::exit(RESTART_EXIT_CODE);
        }
    });

    let http_addr = env::var("GATEWAY_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let _ = tokio::join!(web::new_http_server(store, restart_tx, http_addr), ingress);
    Ok(())
}
