//! Media-side collaborators of a connection: ports, codecs, SDP and the
//! session negotiator that ties them together.

pub mod codec;
pub mod negotiator;
pub mod port_allocator;
pub mod sdp;
pub mod session;

pub use codec::{lookup_codec, CodecCapabilities, StaticCodecCapabilities};
pub use negotiator::{RtpSessionNegotiator, SessionNegotiator};
pub use port_allocator::{AllocationError, PortAllocator, PortPool, PortRange};
pub use sdp::{BasicSdpCodec, MediaDescription, SdpCodec, SdpError, SessionDescription};
pub use session::{RtpSession, SessionStatistics};
