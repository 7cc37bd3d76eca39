use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};
use tokio::sync::mpsc;

use common::packet::Packet;

use crate::broker::{BrokerLink, BrokerTransport};
use crate::telemetry;

pub const TELEMETRY_TOPIC: &str = "esp32/sensor";

/// Ingress side of the relay: called once per inbound datagram. Decoded
/// frames go onto a bounded channel drained by the worker, so the receive
/// path never waits on the broker.
pub struct RelayCoordinator {
    tx: mpsc::Sender<Packet>,
}

impl RelayCoordinator {
    pub fn new(queue_depth: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (Self { tx }, rx)
    }

    pub fn on_frame_received(&self, raw: &[u8]) {
        let packet = match Packet::decode(raw) {
            Ok(p) => p,
            Err(e) => {
                // a different-size datagram is some unrelated sender's traffic
                debug!("dropping frame: {e}");
                return;
            }
        };

        if self.tx.try_send(packet).is_err() {
            // at-most-once: overflow drops the reading rather than blocking
            warn!("relay queue full, dropping frame");
        }
    }
}

/// Drains decoded frames, translates them and publishes fire-and-forget.
/// Runs on its own thread since the broker client is synchronous. Exits when
/// the ingress side goes away.
pub fn spawn_worker<T>(
    mut rx: mpsc::Receiver<Packet>,
    link: Arc<Mutex<BrokerLink<T>>>,
) -> thread::JoinHandle<()>
where
    T: BrokerTransport + Send + 'static,
{
    thread::spawn(move || {
        while let Some(packet) = rx.blocking_recv() {
            let msg = telemetry::translate(&packet);
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("cannot serialize telemetry: {e}");
                    continue;
                }
            };
            debug!("relay {payload}");

            if let Ok(mut link) = link.lock() {
                link.publish(TELEMETRY_TOPIC, &payload);
            }
        }
    })
}
