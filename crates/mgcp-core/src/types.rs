//! Identifiers, connection modes and media formats shared across layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Connection identifier, rendered in hexadecimal on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    pub fn new(value: u32) -> Self {
        ConnectionId(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        parse_hex(text).map(ConnectionId)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// Call identifier, rendered in hexadecimal on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u32);

impl CallId {
    pub fn new(value: u32) -> Self {
        CallId(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        parse_hex(text).map(CallId)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

fn parse_hex(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || text.len() > 8 {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

/// Monotonic source of connection identifiers; zero is never issued
#[derive(Debug)]
pub struct ConnectionIdGenerator {
    next: AtomicU32,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        ConnectionIdGenerator {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return ConnectionId(id);
            }
        }
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Media direction of a connection (RFC 3435 section 3.2.2.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMode {
    SendOnly,
    RecvOnly,
    SendRecv,
    Inactive,
    Conference,
    Loopback,
    NetworkLoopback,
    NetworkTest,
    ContinuityTest,
}

impl ConnectionMode {
    /// The MGCP `M:` token
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionMode::SendOnly => "sendonly",
            ConnectionMode::RecvOnly => "recvonly",
            ConnectionMode::SendRecv => "sendrecv",
            ConnectionMode::Inactive => "inactive",
            ConnectionMode::Conference => "confrnce",
            ConnectionMode::Loopback => "loopback",
            ConnectionMode::NetworkLoopback => "netwloop",
            ConnectionMode::NetworkTest => "netwtest",
            ConnectionMode::ContinuityTest => "conttest",
        }
    }

    /// The SDP direction attribute advertised for this mode
    pub fn sdp_direction(&self) -> &'static str {
        match self {
            ConnectionMode::SendOnly => "sendonly",
            ConnectionMode::RecvOnly => "recvonly",
            ConnectionMode::Inactive => "inactive",
            _ => "sendrecv",
        }
    }

    /// Whether the mode lets media flow from the endpoint to the network
    pub fn sends(&self) -> bool {
        !matches!(self, ConnectionMode::RecvOnly | ConnectionMode::Inactive)
    }

    /// Whether the mode accepts media from the network
    pub fn receives(&self) -> bool {
        !matches!(self, ConnectionMode::SendOnly | ConnectionMode::Inactive)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sendonly" => Ok(ConnectionMode::SendOnly),
            "recvonly" => Ok(ConnectionMode::RecvOnly),
            "sendrecv" => Ok(ConnectionMode::SendRecv),
            "inactive" => Ok(ConnectionMode::Inactive),
            "confrnce" => Ok(ConnectionMode::Conference),
            "loopback" => Ok(ConnectionMode::Loopback),
            "netwloop" => Ok(ConnectionMode::NetworkLoopback),
            "netwtest" => Ok(ConnectionMode::NetworkTest),
            "conttest" => Ok(ConnectionMode::ContinuityTest),
            other => Err(format!("Unsupported connection mode: {}", other)),
        }
    }
}

/// One RTP payload format as it appears in an `m=` line and its `rtpmap`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFormat {
    pub payload_id: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: u8,
    pub fmtp: Option<String>,
}

impl MediaFormat {
    pub fn new(payload_id: u8, name: impl Into<String>, clock_rate: u32) -> Self {
        MediaFormat {
            payload_id,
            name: name.into(),
            clock_rate,
            channels: 1,
            fmtp: None,
        }
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_fmtp(mut self, fmtp: impl Into<String>) -> Self {
        self.fmtp = Some(fmtp.into());
        self
    }

    /// Payload types 96-127 are bound by `rtpmap` rather than RFC 3551
    pub fn is_dynamic(&self) -> bool {
        self.payload_id >= 96
    }

    /// RFC 4733 named telephone events
    pub fn is_dtmf(&self) -> bool {
        self.name.eq_ignore_ascii_case("telephone-event")
    }

    /// Static formats match by payload id, dynamic ones by encoding name and clock rate.
    pub fn matches(&self, other: &MediaFormat) -> bool {
        if !self.is_dynamic() && !other.is_dynamic() {
            return self.payload_id == other.payload_id;
        }
        !self.name.is_empty()
            && self.name.eq_ignore_ascii_case(&other.name)
            && self.clock_rate == other.clock_rate
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.payload_id, self.name, self.clock_rate)?;
        if self.channels > 1 {
            write!(f, "/{}", self.channels)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_hex() {
        assert_eq!(ConnectionId::new(255).to_string(), "FF");
        assert_eq!(CallId::from_hex("1a"), Some(CallId::new(26)));
        assert_eq!(CallId::from_hex("xyz"), None);
        assert_eq!(CallId::from_hex(""), None);
        assert_eq!(ConnectionId::from_hex("123456789"), None);
    }

    #[test]
    fn generator_skips_zero() {
        let generator = ConnectionIdGenerator::new();
        assert_eq!(generator.next_id(), ConnectionId::new(1));
        assert_eq!(generator.next_id(), ConnectionId::new(2));
    }

    #[test]
    fn mode_tokens() {
        assert_eq!("SendRecv".parse::<ConnectionMode>(), Ok(ConnectionMode::SendRecv));
        assert_eq!("confrnce".parse::<ConnectionMode>(), Ok(ConnectionMode::Conference));
        assert!("bogus".parse::<ConnectionMode>().is_err());
        assert_eq!(ConnectionMode::NetworkLoopback.sdp_direction(), "sendrecv");
        assert!(!ConnectionMode::Inactive.sends());
        assert!(ConnectionMode::SendOnly.sends());
        assert!(!ConnectionMode::SendOnly.receives());
    }

    #[test]
    fn format_matching() {
        let pcmu = MediaFormat::new(0, "PCMU", 8000);
        let offered_pcmu = MediaFormat::new(0, "", 8000);
        assert!(pcmu.matches(&offered_pcmu));

        let opus_local = MediaFormat::new(111, "opus", 48000).with_channels(2);
        let opus_remote = MediaFormat::new(120, "OPUS", 48000).with_channels(2);
        assert!(opus_local.matches(&opus_remote));

        let dtmf_16k = MediaFormat::new(101, "telephone-event", 16000);
        let dtmf_8k = MediaFormat::new(101, "telephone-event", 8000);
        assert!(!dtmf_16k.matches(&dtmf_8k));
        assert!(dtmf_8k.is_dtmf());
    }
}
