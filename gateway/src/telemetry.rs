use common::packet::{Packet, VERSION_CURRENT};

/// Broker payload. Field order is the wire contract: consumers parse the
/// object positionally in places, so keep it stable.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TelemetryMessage {
    pub version: u8,
    pub slave_id: u8,
    pub temperature: f64, // °C
    pub humidity: f64,    // percent
    pub pressure: f64,    // hPa
}

/// Pure packet-to-message mapping. Never fails: the gateway has no domain
/// knowledge to reject implausible sensor values, they pass through scaled.
pub fn translate(p: &Packet) -> TelemetryMessage {
    TelemetryMessage {
        version: p.version,
        // slave ids only exist since protocol version 2
        slave_id: if p.version == VERSION_CURRENT { p.slave_id } else { 0 },
        temperature: p.temperature as f64 / 100.0,
        humidity: p.humidity as f64 / 100.0,
        pressure: p.pressure as f64 / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_by_one_hundred() {
        let p = Packet {
            version: 2,
            slave_id: 1,
            temperature: 2354,
            humidity: 4512,
            pressure: 101325,
        };
        let msg = translate(&p);
        assert_eq!(msg.temperature, 23.54);
        assert_eq!(msg.humidity, 45.12);
        assert_eq!(msg.pressure, 1013.25);
    }

    #[test]
    fn slave_id_gated_on_version() {
        let p = Packet {
            version: 1,
            slave_id: 9,
            ..Packet::default()
        };
        assert_eq!(translate(&p).slave_id, 0);

        let p = Packet { version: 2, ..p };
        assert_eq!(translate(&p).slave_id, 9);

        // only exactly version 2 carries a slave id
        let p = Packet { version: 3, ..p };
        assert_eq!(translate(&p).slave_id, 0);
    }

    #[test]
    fn payload_scenario_current_version() {
        let p = Packet {
            version: 2,
            slave_id: 5,
            temperature: 2350,
            humidity: 4512,
            pressure: 101325,
        };
        let payload = serde_json::to_string(&translate(&p)).unwrap();
        assert_eq!(
            payload,
            r#"{"version":2,"slave_id":5,"temperature":23.5,"humidity":45.12,"pressure":1013.25}"#
        );
    }

    #[test]
    fn payload_scenario_legacy_version() {
        let p = Packet {
            version: 1,
            slave_id: 9,
            temperature: 1000,
            humidity: 5000,
            pressure: 100000,
        };
        let payload = serde_json::to_string(&translate(&p)).unwrap();
        assert_eq!(
            payload,
            r#"{"version":1,"slave_id":0,"temperature":10.0,"humidity":50.0,"pressure":1000.0}"#
        );
    }
}
