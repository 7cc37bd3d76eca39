use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rumqttc::{Client, ConnectReturnCode, Event, MqttOptions, Packet, QoS};

use crate::settings::MqttSettings;

const CLIENT_ID: &str = "iotnet-master";
const KEEP_ALIVE: Duration = Duration::from_secs(5);
const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Seam between the link state machine and the actual MQTT client, so the
/// relay tests can count connect/publish attempts.
pub trait BrokerTransport {
    /// One synchronous connect attempt. No internal retries.
    fn connect(&mut self, cfg: &MqttSettings) -> Result<()>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
    /// Lazy liveness query, answered from the last thing the transport saw.
    fn is_connected(&self) -> bool;
}

/// Connection-state owner for the broker side of the relay.
///
/// `ensure_connected` is driven by the reconnect loop on its own cadence,
/// `publish` by the relay worker per frame; both run under one mutex
/// (`Arc<Mutex<BrokerLink<_>>>`), which keeps the two paths' state
/// transitions from interleaving.
pub struct BrokerLink<T> {
    transport: T,
    state: LinkState,
}

impl<T: BrokerTransport> BrokerLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// No-op when already connected. Otherwise exactly one connect attempt
    /// with the settings passed in (the caller re-reads them from the store,
    /// so a reconfiguration is picked up on the next cycle). Failure is
    /// logged and returned, never retried here.
    pub fn ensure_connected(&mut self, cfg: &MqttSettings) -> Result<()> {
        if self.state == LinkState::Connected {
            return Ok(());
        }

        info!("connecting to MQTT server {}:{}", cfg.server, cfg.port);
        match self.transport.connect(cfg) {
            Ok(()) => {
                self.state = LinkState::Connected;
                info!("MQTT connected");
                Ok(())
            }
            Err(e) => {
                warn!("failed to connect MQTT: {e:#}");
                Err(e)
            }
        }
    }

    /// Best-effort, at-most-once: skipped silently unless connected. A dead
    /// transport is only noticed here, lazily, and downgrades the state; a
    /// publish error does not (the transport's keep-alive reports true
    /// disconnection on a later cycle).
    pub fn publish(&mut self, topic: &str, payload: &str) {
        if self.state != LinkState::Connected {
            return;
        }
        if !self.transport.is_connected() {
            debug!("broker link lost, dropping publish");
            self.state = LinkState::Disconnected;
            return;
        }
        if let Err(e) = self.transport.publish(topic, payload.as_bytes()) {
            warn!("MQTT publish failed: {e:#}");
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// rumqttc-backed transport. A background thread services the connection;
/// it exits on the first connection error after clearing the liveness flag,
/// so every new attempt goes through `connect` again.
pub struct MqttTransport {
    client: Option<Client>,
    alive: Arc<AtomicBool>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            client: None,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BrokerTransport for MqttTransport {
    fn connect(&mut self, cfg: &MqttSettings) -> Result<()> {
        let mut options = MqttOptions::new(CLIENT_ID, cfg.server.clone(), cfg.port);
        options.set_keep_alive(KEEP_ALIVE);
        if !cfg.username.is_empty() {
            options.set_credentials(cfg.username.clone(), cfg.password.clone());
        }

        let (client, mut connection) = Client::new(options, 16);
        let alive = Arc::new(AtomicBool::new(false));
        let flag = alive.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("mqtt-link".to_string())
            .spawn(move || {
                let mut ready_tx = Some(ready_tx);
                for event in connection.iter() {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if ack.code == ConnectReturnCode::Success {
                                flag.store(true, Ordering::SeqCst);
                                if let Some(tx) = ready_tx.take() {
                                    let _ = tx.send(Ok(()));
                                }
                            } else {
                                if let Some(tx) = ready_tx.take() {
                                    let _ = tx.send(Err(format!("broker refused: {:?}", ack.code)));
                                }
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("MQTT connection error: {e}");
                            if let Some(tx) = ready_tx.take() {
                                let _ = tx.send(Err(e.to_string()));
                            }
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
            })
            .context("cannot spawn mqtt link thread")?;

        match ready_rx.recv_timeout(CONNACK_TIMEOUT) {
            Ok(Ok(())) => {
                self.client = Some(client);
                self.alive = alive;
                Ok(())
            }
            Ok(Err(reason)) => bail!("{reason}"),
            Err(_) => bail!("timed out waiting for broker connack"),
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let client = self.client.as_ref().context("no MQTT client")?;
        client.publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::FakeTransport;
    use super::*;

    fn cfg() -> MqttSettings {
        MqttSettings::default()
    }

    #[test]
    fn connect_is_idempotent() {
        let mut link = BrokerLink::new(FakeTransport::default());
        for _ in 0..5 {
            link.ensure_connected(&cfg()).unwrap();
        }
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.transport().connects, 1);
    }

    #[test]
    fn failed_connect_leaves_disconnected_and_is_not_retried_within_call() {
        let mut link = BrokerLink::new(FakeTransport {
            fail_connect: true,
            ..Default::default()
        });

        assert!(link.ensure_connected(&cfg()).is_err());
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.transport().connects, 1);

        // the next caller-driven cycle tries again
        assert!(link.ensure_connected(&cfg()).is_err());
        assert_eq!(link.transport().connects, 2);
    }

    #[test]
    fn publish_is_skipped_while_disconnected() {
        let mut link = BrokerLink::new(FakeTransport::default());
        link.publish("esp32/sensor", "{}");
        assert!(link.transport().published.is_empty());
    }

    #[test]
    fn dead_transport_is_noticed_lazily_on_publish() {
        let mut link = BrokerLink::new(FakeTransport::default());
        link.ensure_connected(&cfg()).unwrap();

        link.transport_mut().alive = false;
        link.publish("esp32/sensor", "{}");

        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.transport().published.is_empty());
    }

    #[test]
    fn publish_error_does_not_change_state() {
        let mut link = BrokerLink::new(FakeTransport::default());
        link.ensure_connected(&cfg()).unwrap();

        link.transport_mut().fail_publish = true;
        link.publish("esp32/sensor", "{}");

        assert_eq!(link.state(), LinkState::Connected);
    }
}
