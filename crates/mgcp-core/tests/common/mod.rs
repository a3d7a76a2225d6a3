#![allow(dead_code)]

use async_trait::async_trait;
use rvoip_mgcp_core::media::{
    BasicSdpCodec, MediaDescription, PortPool, PortRange, RtpSession, RtpSessionNegotiator, SessionNegotiator,
    StaticCodecCapabilities,
};
use rvoip_mgcp_core::state_machine::ConnectionServices;
use rvoip_mgcp_core::timer::TokioScheduler;
use rvoip_mgcp_core::{ConnectionFactory, ConnectionMode, ConnectionResult, MediaFormat, MgcpConfig};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How `negotiate` behaves in a test
pub enum NegotiateBehavior {
    Immediate,
    /// Waits until the gate is notified
    Gated(Arc<Notify>),
    /// Never completes
    Hang,
    /// Completes after a fixed delay on the tokio clock
    Delay(Duration),
}

/// Real negotiator with call counters and a controllable negotiate step
pub struct CountingNegotiator {
    inner: RtpSessionNegotiator,
    pub pool: Arc<PortPool>,
    behavior: NegotiateBehavior,
    pub opens: AtomicUsize,
    pub negotiations: AtomicUsize,
    pub closes: AtomicUsize,
}

impl CountingNegotiator {
    pub fn new(behavior: NegotiateBehavior) -> Arc<Self> {
        let pool = Arc::new(PortPool::new(PortRange::new(40000, 40100)));
        let codecs = Arc::new(StaticCodecCapabilities::from_names(&["PCMU", "PCMA", "telephone-event"]));
        Arc::new(CountingNegotiator {
            inner: RtpSessionNegotiator::new(pool.clone(), codecs),
            pool,
            behavior,
            opens: AtomicUsize::new(0),
            negotiations: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn ports_in_use(&self) -> usize {
        self.pool.in_use()
    }
}

#[async_trait]
impl SessionNegotiator for CountingNegotiator {
    async fn open(&self, bind_address: IpAddr) -> ConnectionResult<Arc<RtpSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(bind_address).await
    }

    async fn negotiate(&self, session: &RtpSession, remote: &MediaDescription) -> ConnectionResult<Vec<MediaFormat>> {
        self.negotiations.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            NegotiateBehavior::Immediate => {}
            NegotiateBehavior::Gated(gate) => gate.notified().await,
            NegotiateBehavior::Hang => std::future::pending::<()>().await,
            NegotiateBehavior::Delay(delay) => tokio::time::sleep(*delay).await,
        }
        self.inner.negotiate(session, remote).await
    }

    async fn update_mode(&self, session: &RtpSession, mode: ConnectionMode) -> ConnectionResult<()> {
        self.inner.update_mode(session, mode).await
    }

    async fn close(&self, session: &RtpSession) -> ConnectionResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close(session).await
    }

    fn supported_formats(&self) -> Vec<MediaFormat> {
        self.inner.supported_formats()
    }
}

pub fn services(negotiator: Arc<CountingNegotiator>) -> ConnectionServices {
    ConnectionServices {
        negotiator,
        sdp: Arc::new(BasicSdpCodec::new()),
        scheduler: Arc::new(TokioScheduler::new()),
    }
}

pub fn factory(negotiator: Arc<CountingNegotiator>) -> Arc<ConnectionFactory> {
    Arc::new(ConnectionFactory::new(&MgcpConfig::default(), services(negotiator)))
}

/// Remote audio offer from 10.0.0.5 with the given `(payload, rtpmap)` pairs
pub fn offer(port: u16, formats: &[(u8, &str)]) -> String {
    let ids: Vec<String> = formats.iter().map(|(id, _)| id.to_string()).collect();
    let mut sdp = format!(
        "v=0\r\no=remote 2890844526 2890844526 IN IP4 10.0.0.5\r\ns=call\r\nc=IN IP4 10.0.0.5\r\nt=0 0\r\nm=audio {} RTP/AVP {}\r\n",
        port,
        ids.join(" ")
    );
    for (id, rtpmap) in formats {
        sdp.push_str(&format!("a=rtpmap:{} {}\r\n", id, rtpmap));
    }
    sdp
}

pub fn pcmu_offer() -> String {
    offer(49170, &[(0, "PCMU/8000"), (101, "telephone-event/8000")])
}
