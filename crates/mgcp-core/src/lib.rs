//! # rvoip-mgcp-core
//!
//! Connection lifecycle engine for an MGCP media server endpoint.
//!
//! A connection moves from creation through SDP offer/answer, RTP session
//! allocation, mode changes and teardown. Every connection is driven by a
//! table-driven state machine whose events are processed one at a time on
//! a dedicated task; asynchronous work (port allocation, negotiation,
//! timers) reports back by queueing new events.
//!
//! ## Layers
//!
//! - [`timer`]: delayed callbacks with cancellation
//! - [`media`]: port allocation, codec capabilities, SDP and the
//!   [`SessionNegotiator`](media::SessionNegotiator)
//! - [`state_table`]: the static transition table
//! - [`state_machine`]: the single-writer executor interpreting it
//! - [`connection`]: the [`Connection`](connection::Connection) facade
//! - [`endpoint`] and [`command`]: MGCP verbs (CRCX, MDCX, DLCX, AUCX, RQNT)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_mgcp_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MgcpConfig::default();
//! let factory = Arc::new(ConnectionFactory::from_config(&config)?);
//! let connection = factory.create(CallId::new(1));
//!
//! let local_sdp = connection.open(ConnectionMode::SendRecv, None).await?;
//! assert_eq!(connection.current_state(), ConnectionState::HalfOpen);
//! println!("offer:\n{}", local_sdp);
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod errors;
pub mod media;
pub mod state_machine;
pub mod state_table;
pub mod timer;
pub mod types;

pub use config::MgcpConfig;
pub use connection::{Connection, ConnectionFactory, ConnectionKind, LocalConnectionOptions, ModifyRequest};
pub use errors::{ConnectionError, ConnectionResult, ErrorKind, NegotiationFailure};
pub use state_table::{ConnectionState, EventType};
pub use types::{CallId, ConnectionId, ConnectionMode, MediaFormat};

pub mod prelude {
    pub use crate::command::{CommandProcessor, MgcpRequest, MgcpResponse, Parameter, ResponseCode};
    pub use crate::config::MgcpConfig;
    pub use crate::connection::{Connection, ConnectionFactory, ConnectionKind, LocalConnectionOptions, ModifyRequest};
    pub use crate::endpoint::{Endpoint, EndpointManager};
    pub use crate::errors::{ConnectionError, ConnectionResult, ErrorKind, NegotiationFailure};
    pub use crate::media::{
        BasicSdpCodec, CodecCapabilities, PortAllocator, PortPool, RtpSession, RtpSessionNegotiator,
        SdpCodec, SessionNegotiator, StaticCodecCapabilities,
    };
    pub use crate::state_table::{ConnectionState, EventType};
    pub use crate::timer::{Scheduler, TimerHandle, TokioScheduler};
    pub use crate::types::{CallId, ConnectionId, ConnectionMode, MediaFormat};
}
