use crate::types::{ConnectionMode, MediaFormat};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// RTP counters reported as MGCP connection parameters (RFC 3435 section 3.2.2.11)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    pub packets_sent: u64,
    pub octets_sent: u64,
    pub packets_received: u64,
    pub octets_received: u64,
}

impl fmt::Display for SessionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PS={}, OS={}, PR={}, OR={}",
            self.packets_sent, self.octets_sent, self.packets_received, self.octets_received
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    packets_sent: AtomicU64,
    octets_sent: AtomicU64,
    packets_received: AtomicU64,
    octets_received: AtomicU64,
}

#[derive(Debug)]
struct SessionState {
    formats: Vec<MediaFormat>,
    mode: ConnectionMode,
    remote_address: Option<SocketAddr>,
}

/// An allocated RTP session bound to a local port.
///
/// Owned by exactly one connection. The closed flag flips once, so the
/// negotiator can release the port exactly once however often `close` runs.
#[derive(Debug)]
pub struct RtpSession {
    local_address: SocketAddr,
    state: Mutex<SessionState>,
    counters: Counters,
    closed: AtomicBool,
}

impl RtpSession {
    pub fn new(local_address: SocketAddr) -> Self {
        RtpSession {
            local_address,
            state: Mutex::new(SessionState {
                formats: Vec::new(),
                mode: ConnectionMode::Inactive,
                remote_address: None,
            }),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Negotiated formats, highest priority first
    pub fn formats(&self) -> Vec<MediaFormat> {
        self.state.lock().formats.clone()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.state.lock().mode
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.state.lock().remote_address
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub fn set_formats(&self, formats: Vec<MediaFormat>) {
        self.state.lock().formats = formats;
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        self.state.lock().mode = mode;
    }

    pub fn set_remote_address(&self, address: Option<SocketAddr>) {
        self.state.lock().remote_address = address;
    }

    /// Count one outgoing RTP packet of `octets` payload bytes
    pub fn record_sent(&self, octets: usize) {
        self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.octets_sent.fetch_add(octets as u64, Ordering::Relaxed);
    }

    /// Count one incoming RTP packet of `octets` payload bytes
    pub fn record_received(&self, octets: usize) {
        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
        self.counters.octets_received.fetch_add(octets as u64, Ordering::Relaxed);
    }

    pub fn statistics(&self) -> SessionStatistics {
        SessionStatistics {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            octets_sent: self.counters.octets_sent.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            octets_received: self.counters.octets_received.load(Ordering::Relaxed),
        }
    }

    /// Flip the session to closed. Returns `true` only for the first caller.
    pub fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.state.lock().mode = ConnectionMode::Inactive;
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_render_as_connection_parameters() {
        let session = RtpSession::new("127.0.0.1:40000".parse().unwrap());
        assert_eq!(session.statistics().to_string(), "PS=0, OS=0, PR=0, OR=0");

        session.record_sent(160);
        session.record_sent(160);
        session.record_received(172);

        assert_eq!(
            session.statistics(),
            SessionStatistics {
                packets_sent: 2,
                octets_sent: 320,
                packets_received: 1,
                octets_received: 172,
            }
        );
        assert_eq!(session.statistics().to_string(), "PS=2, OS=320, PR=1, OR=172");
    }

    #[test]
    fn close_happens_once() {
        let session = RtpSession::new("127.0.0.1:40002".parse().unwrap());
        session.set_mode(ConnectionMode::SendRecv);
        assert!(session.mark_closed());
        assert!(!session.mark_closed());
        assert!(!session.is_open());
        assert_eq!(session.mode(), ConnectionMode::Inactive);
    }
}
