//! Session negotiation: allocate, negotiate, change mode, release.

use crate::errors::{ConnectionError, ConnectionResult};
use crate::media::codec::CodecCapabilities;
use crate::media::port_allocator::PortAllocator;
use crate::media::sdp::MediaDescription;
use crate::media::session::RtpSession;
use crate::types::{ConnectionMode, MediaFormat};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Media-side operations a connection drives while opening, modifying and
/// closing. Implementations may complete at any time; the state machine
/// always consumes the outcome as a queued event.
#[async_trait]
pub trait SessionNegotiator: Send + Sync {
    /// Allocate a session bound to `bind_address`
    async fn open(&self, bind_address: IpAddr) -> ConnectionResult<Arc<RtpSession>>;

    /// Intersect local capabilities with `remote`, keeping offer order
    async fn negotiate(&self, session: &RtpSession, remote: &MediaDescription) -> ConnectionResult<Vec<MediaFormat>>;

    /// Switch the media direction. Idempotent.
    async fn update_mode(&self, session: &RtpSession, mode: ConnectionMode) -> ConnectionResult<()>;

    /// Release the session. Closing an already closed session succeeds.
    async fn close(&self, session: &RtpSession) -> ConnectionResult<()>;

    /// Formats advertised in a local offer
    fn supported_formats(&self) -> Vec<MediaFormat>;
}

/// Negotiator backed by a shared port pool and a codec capability list
pub struct RtpSessionNegotiator {
    ports: Arc<dyn PortAllocator>,
    codecs: Arc<dyn CodecCapabilities>,
}

impl RtpSessionNegotiator {
    pub fn new(ports: Arc<dyn PortAllocator>, codecs: Arc<dyn CodecCapabilities>) -> Self {
        RtpSessionNegotiator { ports, codecs }
    }

    /// Formats both sides support, in offer order, carrying the remote payload ids.
    pub fn intersect(local: &[MediaFormat], offered: &[MediaFormat]) -> Vec<MediaFormat> {
        offered
            .iter()
            .filter_map(|remote| {
                local.iter().find(|l| l.matches(remote)).map(|l| MediaFormat {
                    payload_id: remote.payload_id,
                    name: l.name.clone(),
                    clock_rate: l.clock_rate,
                    channels: l.channels,
                    fmtp: remote.fmtp.clone().or_else(|| l.fmtp.clone()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionNegotiator for RtpSessionNegotiator {
    async fn open(&self, bind_address: IpAddr) -> ConnectionResult<Arc<RtpSession>> {
        let address = self
            .ports
            .allocate(bind_address, None)
            .map_err(|e| ConnectionError::allocation(e.to_string()))?;
        info!("Opened RTP session on {}", address);
        Ok(Arc::new(RtpSession::new(address)))
    }

    async fn negotiate(&self, session: &RtpSession, remote: &MediaDescription) -> ConnectionResult<Vec<MediaFormat>> {
        if !remote.is_audio() {
            return Err(ConnectionError::malformed_offer(format!(
                "unsupported media type {}",
                remote.media_type
            )));
        }
        let remote_address = remote
            .remote_endpoint()
            .ok_or_else(|| ConnectionError::malformed_offer("offer has no connection address"))?;

        let agreed = Self::intersect(&self.codecs.supported_formats(), &remote.formats);
        if agreed.iter().all(|format| format.is_dtmf()) {
            let offered: Vec<String> = remote.formats.iter().map(|f| f.to_string()).collect();
            return Err(ConnectionError::no_common_format(format!(
                "offer [{}] shares no audio codec",
                offered.join(", ")
            )));
        }

        debug!(
            "Negotiated {} format(s) with {}",
            agreed.len(),
            remote_address
        );
        session.set_formats(agreed.clone());
        session.set_remote_address(Some(remote_address));
        Ok(agreed)
    }

    async fn update_mode(&self, session: &RtpSession, mode: ConnectionMode) -> ConnectionResult<()> {
        if !session.is_open() {
            return Err(ConnectionError::Closed);
        }
        session.set_mode(mode);
        debug!("Session {} mode set to {}", session.local_address(), mode);
        Ok(())
    }

    async fn close(&self, session: &RtpSession) -> ConnectionResult<()> {
        if session.mark_closed() {
            self.ports.release(session.local_address());
            info!("Closed RTP session on {}", session.local_address());
        }
        Ok(())
    }

    fn supported_formats(&self) -> Vec<MediaFormat> {
        self.codecs.supported_formats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NegotiationFailure;
    use crate::media::codec::StaticCodecCapabilities;
    use crate::media::port_allocator::{PortPool, PortRange};
    use std::net::Ipv4Addr;

    fn negotiator(pool: Arc<PortPool>) -> RtpSessionNegotiator {
        RtpSessionNegotiator::new(pool, Arc::new(StaticCodecCapabilities::default()))
    }

    fn offer(formats: Vec<MediaFormat>) -> MediaDescription {
        let mut media = MediaDescription::audio(40000, formats);
        media.connection_address = Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        media
    }

    #[tokio::test]
    async fn negotiation_keeps_offer_order() {
        let pool = Arc::new(PortPool::new(PortRange::new(5000, 5010)));
        let negotiator = negotiator(pool);
        let session = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let remote = offer(vec![
            MediaFormat::new(18, "G729", 8000),
            MediaFormat::new(8, "PCMA", 8000),
            MediaFormat::new(0, "PCMU", 8000),
            MediaFormat::new(96, "telephone-event", 8000),
        ]);
        let agreed = negotiator.negotiate(&session, &remote).await.unwrap();

        let ids: Vec<u8> = agreed.iter().map(|f| f.payload_id).collect();
        assert_eq!(ids, vec![8, 0, 96]);
        assert_eq!(session.formats(), agreed);
        assert_eq!(session.remote_address(), Some("192.0.2.1:40000".parse().unwrap()));
    }

    #[tokio::test]
    async fn dtmf_only_intersection_is_no_common_format() {
        let pool = Arc::new(PortPool::new(PortRange::new(5000, 5010)));
        let negotiator = negotiator(pool);
        let session = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let remote = offer(vec![
            MediaFormat::new(18, "G729", 8000),
            MediaFormat::new(101, "telephone-event", 8000),
        ]);
        let err = negotiator.negotiate(&session, &remote).await.unwrap_err();
        assert_eq!(err.negotiation_failure(), Some(NegotiationFailure::NoCommonFormat));
    }

    #[tokio::test]
    async fn offer_without_address_is_malformed() {
        let pool = Arc::new(PortPool::new(PortRange::new(5000, 5010)));
        let negotiator = negotiator(pool);
        let session = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let remote = MediaDescription::audio(40000, vec![MediaFormat::new(0, "PCMU", 8000)]);
        let err = negotiator.negotiate(&session, &remote).await.unwrap_err();
        assert_eq!(err.negotiation_failure(), Some(NegotiationFailure::MalformedOffer));
    }

    #[tokio::test]
    async fn close_releases_port_once() {
        let pool = Arc::new(PortPool::new(PortRange::new(5000, 5002)));
        let negotiator = negotiator(pool.clone());
        let session = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        assert_eq!(pool.in_use(), 1);

        negotiator.close(&session).await.unwrap();
        negotiator.close(&session).await.unwrap();
        assert_eq!(pool.in_use(), 0);
        assert!(!session.is_open());
        assert_eq!(
            negotiator.update_mode(&session, ConnectionMode::SendRecv).await,
            Err(ConnectionError::Closed)
        );
    }

    #[tokio::test]
    async fn exhausted_pool_is_allocation_error() {
        let pool = Arc::new(PortPool::new(PortRange::new(5000, 5000)));
        let negotiator = negotiator(pool);
        let _first = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let err = negotiator.open(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Allocation);
    }
}
