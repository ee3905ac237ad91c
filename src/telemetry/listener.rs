//! UDP listener feeding the session aggregator

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use super::{Payload, TelemetryStats, decode};
use crate::session::{ApplyOutcome, SessionAggregator};
use crate::{Error, Result};

/// Largest datagram the game sends is well under this
const RECV_BUFFER: usize = 2048;

/// Listener settings
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// First rebind delay after a socket error (doubles each attempt)
    pub backoff_base: Duration,
    /// Rebind delay cap
    pub backoff_max: Duration,
    /// How often counters are logged at debug level
    pub stats_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 20777,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            stats_interval: Duration::from_secs(1),
        }
    }
}

impl ListenerConfig {
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Delay before rebind attempt `attempt` (zero-based)
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.backoff_max)
    }
}

/// Decode one datagram and merge it, updating the counters
///
/// Returns the merge outcome, or `None` when nothing was merged
/// (malformed datagram or opaque payload).
pub fn ingest(
    aggregator: &mut SessionAggregator,
    stats: &TelemetryStats,
    bytes: &[u8],
) -> Option<ApplyOutcome> {
    stats.record_received();
    match decode(bytes) {
        Ok(packet) => {
            if matches!(packet.payload, Payload::Opaque { .. }) {
                stats.record_opaque();
                return None;
            }
            stats.record_decoded();
            let outcome = aggregator.apply(&packet);
            if outcome.frame_regressed {
                stats.record_frame_regression();
            }
            Some(outcome)
        }
        Err(e) => {
            stats.record_malformed();
            tracing::trace!(error = %e, len = bytes.len(), "dropped datagram");
            None
        }
    }
}

/// Owns the socket and the aggregator for the life of the daemon
pub struct TelemetryListener {
    socket: UdpSocket,
    config: ListenerConfig,
    stats: Arc<TelemetryStats>,
}

impl TelemetryListener {
    /// Bind the telemetry socket
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound; this is fatal at startup
    pub async fn bind(config: ListenerConfig, stats: Arc<TelemetryStats>) -> Result<Self> {
        let addr = config.addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::Telemetry(format!("failed to bind {addr}: {e}")))?;
        tracing::info!(%addr, "telemetry listener bound");
        Ok(Self {
            socket,
            config,
            stats,
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until shutdown, merging every datagram in arrival order
    ///
    /// Outcomes carrying a lap, sector or session transition are forwarded
    /// with `try_send`; a full or closed channel never stalls the socket.
    ///
    /// # Errors
    ///
    /// Never returns an error once bound; socket failures trigger a rebind
    pub async fn run(
        self,
        mut aggregator: SessionAggregator,
        transitions: mpsc::Sender<ApplyOutcome>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let Self {
            mut socket,
            config,
            stats,
        } = self;
        let mut buf = [0u8; RECV_BUFFER];
        let mut stats_tick = tokio::time::interval(config.stats_interval);
        let mut last_logged = stats.snapshot();

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = stats_tick.tick() => {
                    let now = stats.snapshot();
                    if now != last_logged {
                        tracing::debug!(
                            received = now.received,
                            decoded = now.decoded,
                            dropped_malformed = now.dropped_malformed,
                            opaque = now.opaque,
                            frame_regressions = now.frame_regressions,
                            per_sec = now.received - last_logged.received,
                            "telemetry stats"
                        );
                        last_logged = now;
                    }
                }
                recv = socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, _source)) => {
                            if let Some(outcome) = ingest(&mut aggregator, &stats, &buf[..len]) {
                                let notable = outcome.session_changed
                                    || outcome.lap_completed.is_some()
                                    || outcome.sector_changed.is_some();
                                if notable {
                                    forward_transition(&transitions, outcome);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "telemetry socket failed, rebinding");
                            drop(socket);
                            match rebind(&config, &mut shutdown).await {
                                Some(fresh) => socket = fresh,
                                None => break,
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("telemetry listener stopped");
        Ok(())
    }
}

/// Recreate the socket with exponential backoff; `None` on shutdown
/// Hand a notable outcome to the advisor without blocking the socket loop
///
/// Returns whether the outcome was delivered.
fn forward_transition(transitions: &mpsc::Sender<ApplyOutcome>, outcome: ApplyOutcome) -> bool {
    match transitions.try_send(outcome) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            tracing::debug!(
                lap = ?dropped.lap_completed.map(|l| l.lap_number),
                sector = ?dropped.sector_changed,
                "advisor busy, transition dropped"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("advisor gone, transition dropped");
            false
        }
    }
}

async fn rebind(config: &ListenerConfig, shutdown: &mut watch::Receiver<bool>) -> Option<UdpSocket> {
    let addr = config.addr();
    let mut attempt = 0u32;

    loop {
        let delay = config.backoff_delay(attempt);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
        }

        match UdpSocket::bind(addr).await {
            Ok(socket) => {
                tracing::info!(%addr, attempt, "telemetry socket rebound");
                return Some(socket);
            }
            Err(e) => {
                tracing::error!(%addr, attempt, error = %e, "rebind failed");
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
