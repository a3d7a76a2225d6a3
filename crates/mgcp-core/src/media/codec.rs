//! Local codec capabilities.

use crate::types::MediaFormat;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Well-known formats by upper-cased encoding name: static RFC 3551 payload
/// types plus the dynamic ids this server advertises in its own offers.
static CODEC_REGISTRY: Lazy<HashMap<String, MediaFormat>> = Lazy::new(|| {
    let formats = [
        MediaFormat::new(0, "PCMU", 8000),
        MediaFormat::new(3, "GSM", 8000),
        MediaFormat::new(8, "PCMA", 8000),
        MediaFormat::new(9, "G722", 8000),
        MediaFormat::new(18, "G729", 8000),
        MediaFormat::new(97, "iLBC", 8000).with_fmtp("mode=30"),
        MediaFormat::new(101, "telephone-event", 8000).with_fmtp("0-15"),
        MediaFormat::new(111, "opus", 48000).with_channels(2),
    ];
    formats
        .into_iter()
        .map(|format| (format.name.to_ascii_uppercase(), format))
        .collect()
});

/// Look up a format by encoding name, case-insensitively
pub fn lookup_codec(name: &str) -> Option<MediaFormat> {
    CODEC_REGISTRY.get(&name.to_ascii_uppercase()).cloned()
}

/// Look up a static payload type (0-95)
pub fn lookup_static_payload(payload_id: u8) -> Option<MediaFormat> {
    if payload_id >= 96 {
        return None;
    }
    CODEC_REGISTRY
        .values()
        .find(|format| format.payload_id == payload_id)
        .cloned()
}

/// The formats this server can send and receive, in preference order
pub trait CodecCapabilities: Send + Sync {
    fn supported_formats(&self) -> Vec<MediaFormat>;
}

/// Fixed capability list
#[derive(Debug, Clone)]
pub struct StaticCodecCapabilities {
    formats: Vec<MediaFormat>,
}

impl StaticCodecCapabilities {
    pub fn new(formats: Vec<MediaFormat>) -> Self {
        StaticCodecCapabilities { formats }
    }

    /// Build from encoding names; names missing from the registry are skipped.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let formats = names
            .iter()
            .filter_map(|name| {
                let found = lookup_codec(name.as_ref());
                if found.is_none() {
                    warn!("Ignoring unknown codec '{}'", name.as_ref());
                }
                found
            })
            .collect::<Vec<_>>();
        debug!("Codec capabilities: {:?}", formats.iter().map(|f| f.name.as_str()).collect::<Vec<_>>());
        StaticCodecCapabilities { formats }
    }
}

impl Default for StaticCodecCapabilities {
    fn default() -> Self {
        StaticCodecCapabilities::from_names(&["PCMU", "PCMA", "telephone-event"])
    }
}

impl CodecCapabilities for StaticCodecCapabilities {
    fn supported_formats(&self) -> Vec<MediaFormat> {
        self.formats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_ignores_case() {
        assert_eq!(lookup_codec("pcma").map(|f| f.payload_id), Some(8));
        assert_eq!(lookup_codec("OPUS").map(|f| f.clock_rate), Some(48000));
        assert!(lookup_codec("speex").is_none());
        assert_eq!(lookup_static_payload(18).map(|f| f.name), Some("G729".to_string()));
        assert!(lookup_static_payload(101).is_none());
    }

    #[test]
    fn from_names_keeps_order_and_skips_unknown() {
        let caps = StaticCodecCapabilities::from_names(&["PCMA", "nonsense", "PCMU"]);
        let ids: Vec<u8> = caps.supported_formats().iter().map(|f| f.payload_id).collect();
        assert_eq!(ids, vec![8, 0]);
    }
}
