//! Discovery - UDP beacon listener
//!
//! Cameras advertise themselves with a datagram `"<tag>|<camera_id>|<model>"`
//! on port 5555. Anything else is dropped.

use crate::camera_controller::CameraDescriptor;
use crate::error::{Error, Result};
use crate::ghost_session::supervisor::shutdown_requested;
use crate::ghost_session::ShutdownSignal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Default beacon port
pub const DISCOVERY_PORT: u16 = 5555;

/// Default beacon tag
pub const DEFAULT_TAG: &str = "SKCAM";

/// Largest datagram read
const MAX_DATAGRAM: usize = 1024;

/// A camera announced by a valid beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCamera {
    /// Source IP of the beacon
    pub address: String,
    pub camera_id: String,
    pub model: String,
}

impl DiscoveredCamera {
    /// Session-protocol descriptor on the default ports
    pub fn descriptor(&self) -> CameraDescriptor {
        CameraDescriptor::session(&self.camera_id, &self.address, &self.model)
    }
}

/// How long the listener runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Until shutdown
    Continuous,
    /// Until the first valid beacon
    FirstBeacon,
}

/// Parse a beacon payload into `(camera_id, model)`
///
/// Valid only with exactly three `|` separated fields, a matching tag and a
/// non-empty id.
pub fn parse_beacon(payload: &[u8], tag: &str) -> Option<(String, String)> {
    let text = std::str::from_utf8(payload).ok()?;
    let text = text.trim_end_matches(['\0', '\r', '\n']);

    let fields: Vec<&str> = text.split('|').collect();
    match fields.as_slice() {
        [t, id, model] if *t == tag && !id.is_empty() => Some((id.to_string(), model.to_string())),
        _ => None,
    }
}

/// Listens for beacons on one UDP socket
pub struct DiscoveryListener {
    socket: UdpSocket,
    tag: String,
}

impl DiscoveryListener {
    /// Bind `0.0.0.0:<port>` (port 0 picks a free one)
    pub async fn bind(port: u16, tag: impl Into<String>) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::Connection(format!("discovery bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Discovery listener bound");

        Ok(Self {
            socket,
            tag: tag.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Report every valid beacon to `on_found`
    ///
    /// Returns the number of cameras reported. Without a shutdown signal a
    /// `Continuous` listener runs until the caller drops the future.
    pub async fn run<F>(
        &self,
        mode: DiscoveryMode,
        mut on_found: F,
        mut shutdown: Option<ShutdownSignal>,
    ) -> Result<usize>
    where
        F: FnMut(DiscoveredCamera),
    {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut reported = 0usize;

        loop {
            let received = tokio::select! {
                r = self.socket.recv_from(&mut buf) => r,
                _ = shutdown_requested(shutdown.as_mut()) => {
                    tracing::info!(reported, "Discovery stopped by shutdown");
                    return Ok(reported);
                }
            };

            let (len, from) = match received {
                Ok(r) => r,
                Err(e) => {
                    // ICMP errors surface here on some platforms; keep listening
                    tracing::warn!(error = %e, "Discovery receive failed");
                    continue;
                }
            };

            let Some((camera_id, model)) = parse_beacon(&buf[..len], &self.tag) else {
                tracing::debug!(from = %from, len, "Ignoring datagram");
                continue;
            };

            let camera = DiscoveredCamera {
                address: from.ip().to_string(),
                camera_id,
                model,
            };
            tracing::info!(
                camera_id = %camera.camera_id,
                address = %camera.address,
                model = %camera.model,
                "Camera discovered"
            );
            on_found(camera);
            reported += 1;

            if mode == DiscoveryMode::FirstBeacon {
                return Ok(reported);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::watch;

    #[test]
    fn test_parse_valid_beacon() {
        assert_eq!(
            parse_beacon(b"SKCAM|cam-1|XL", "SKCAM"),
            Some(("cam-1".to_string(), "XL".to_string()))
        );
        // empty model is allowed
        assert_eq!(
            parse_beacon(b"SKCAM|cam-1|\n", "SKCAM"),
            Some(("cam-1".to_string(), String::new()))
        );
    }

    #[test]
    fn test_parse_invalid_beacons() {
        assert_eq!(parse_beacon(b"SKCAM|cam-1", "SKCAM"), None);
        assert_eq!(parse_beacon(b"SKCAM|cam-1|XL|extra", "SKCAM"), None);
        assert_eq!(parse_beacon(b"OTHER|cam-1|XL", "SKCAM"), None);
        assert_eq!(parse_beacon(b"SKCAM||XL", "SKCAM"), None);
        assert_eq!(parse_beacon(b"\xff\xfe|cam|XL", "SKCAM"), None);
        assert_eq!(parse_beacon(b"", "SKCAM"), None);
    }

    async fn send_to(port: u16, payload: &[u8]) {
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(payload, ("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn test_first_beacon_skips_invalid_datagrams() {
        let listener = DiscoveryListener::bind(0, DEFAULT_TAG).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            send_to(port, b"garbage").await;
            send_to(port, b"OTHER|cam-x|XL").await;
            send_to(port, b"SKCAM|cam-7|XL").await;
        });

        let mut found = Vec::new();
        let count = tokio::time::timeout(
            Duration::from_secs(5),
            listener.run(DiscoveryMode::FirstBeacon, |c| found.push(c), None),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            found,
            vec![DiscoveredCamera {
                address: "127.0.0.1".to_string(),
                camera_id: "cam-7".to_string(),
                model: "XL".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_continuous_until_shutdown() {
        let listener = DiscoveryListener::bind(0, "TEST").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            send_to(port, b"TEST|a|M1").await;
            send_to(port, b"TEST|b|M2").await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let mut ids = Vec::new();
        let count = tokio::time::timeout(
            Duration::from_secs(5),
            listener.run(DiscoveryMode::Continuous, |c| ids.push(c.camera_id), Some(rx)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_descriptor_from_beacon() {
        let found = DiscoveredCamera {
            address: "192.168.42.1".to_string(),
            camera_id: "cam-1".to_string(),
            model: "XL".to_string(),
        };
        let cam = found.descriptor();
        assert_eq!(cam.id, "cam-1");
        assert_eq!(cam.control_port, 7878);
    }
}
