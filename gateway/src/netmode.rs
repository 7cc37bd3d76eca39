use std::net::{IpAddr, UdpSocket};
use std::time::{Duration, Instant};
use std::{io, thread};

use anyhow::{bail, Result};
use log::{debug, error, info};

use crate::settings::{SettingsStore, MODE_SOFTAP, MODE_STATION};

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Joined to an existing network, uplink available, broker relay armed.
    Station,
    /// Local network only. The broker link is never armed in this mode.
    AccessPoint,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ModeResolution {
    Mode(NetworkMode),
    /// The persisted mode was garbage; it has been reset to softap and the
    /// process must restart before doing anything with the network.
    RestartRequired,
}

pub fn resolve_mode(store: &mut SettingsStore) -> Result<ModeResolution> {
    match store.wifi().mode.as_str() {
        MODE_STATION => Ok(ModeResolution::Mode(NetworkMode::Station)),
        MODE_SOFTAP => Ok(ModeResolution::Mode(NetworkMode::AccessPoint)),
        other => {
            error!("invalid persisted wifi mode {other:?}, resetting to {MODE_SOFTAP}");
            store.set_wifi_mode(MODE_SOFTAP)?;
            Ok(ModeResolution::RestartRequired)
        }
    }
}

/// Station mode: block until the uplink towards `probe_addr` is routable and
/// return the local address picked for it. Retries with capped backoff,
/// forever when no `timeout` is given. There is no fallback to access-point
/// mode here, the operator switches modes explicitly.
pub fn connect_and_wait(probe_addr: &str, timeout: Option<Duration>) -> Result<IpAddr> {
    let started = Instant::now();
    let mut backoff = BACKOFF_START;

    info!("waiting for uplink towards {probe_addr}");
    loop {
        match probe(probe_addr) {
            Ok(addr) => {
                info!("uplink ready, local address {addr}");
                return Ok(addr);
            }
            Err(e) => debug!("uplink probe failed: {e}"),
        }

        if let Some(limit) = timeout {
            if started.elapsed() + backoff >= limit {
                bail!("no uplink towards {probe_addr} after {:?}", started.elapsed());
            }
        }
        thread::sleep(backoff);
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

// No datagram is sent: connect() only resolves the name and asks the kernel
// for a route, which is exactly the "do we have an uplink yet" question.
fn probe(addr: &str) -> io::Result<IpAddr> {
    let sock = UdpSocket::bind("0.0.0.0:0")?;
    sock.connect(addr)?;
    let ip = sock.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "no local address"));
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::tests::temp_store;

    #[test]
    fn resolves_persisted_modes() {
        let mut store = temp_store("mode-softap");
        assert_eq!(
            resolve_mode(&mut store).unwrap(),
            ModeResolution::Mode(NetworkMode::AccessPoint)
        );

        store.set_wifi_mode(MODE_STATION).unwrap();
        assert_eq!(
            resolve_mode(&mut store).unwrap(),
            ModeResolution::Mode(NetworkMode::Station)
        );
    }

    #[test]
    fn invalid_mode_self_heals_and_requires_restart() {
        let mut store = temp_store("mode-invalid");
        store.set_wifi_mode("bridge").unwrap();

        assert_eq!(resolve_mode(&mut store).unwrap(), ModeResolution::RestartRequired);
        assert_eq!(store.wifi().mode, MODE_SOFTAP);
        // healed value resolves normally on the next boot
        assert_eq!(
            resolve_mode(&mut store).unwrap(),
            ModeResolution::Mode(NetworkMode::AccessPoint)
        );
    }

    #[test]
    fn connect_and_wait_returns_loopback_route() {
        // routing towards loopback always works, no packets are sent
        let addr = connect_and_wait("127.0.0.1:1883", Some(Duration::from_secs(5))).unwrap();
        assert!(addr.is_loopback());
    }

    #[test]
    fn connect_and_wait_honors_timeout() {
        // unresolvable name, zero budget: must give up instead of spinning
        let err = connect_and_wait("", Some(Duration::ZERO)).unwrap_err();
        assert!(err.to_string().contains("no uplink"));
    }
}
