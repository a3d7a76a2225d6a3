//! LocalConnectionOptions (`L:`), RFC 3435 section 3.2.2.10.
//!
//! The parameter is a comma separated list of `key:value` items, e.g.
//! `a:PCMU;PCMA, p:20, e:on`. Compression algorithms (`a`) and the
//! packetization period (`p`) shape the local description; echo
//! cancellation and silence suppression are recorded. Unknown keys are
//! kept as written.

use crate::types::MediaFormat;
use nom::{
    IResult,
    bytes::complete::{take_till1, take_while1},
    character::complete::{char, digit1, space0},
    combinator::{all_consuming, map_res, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair, tuple},
};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Malformed local connection options: {0}")]
    Syntax(String),

    #[error("Invalid value '{value}' for local connection option {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalConnectionOptions {
    /// `a:` codec names, most preferred first
    pub codecs: Vec<String>,
    /// `p:` packetization period in milliseconds (lower bound of a range)
    pub packetization_ms: Option<u32>,
    /// `e:`
    pub echo_cancellation: Option<bool>,
    /// `s:`
    pub silence_suppression: Option<bool>,
    pub other: Vec<(String, String)>,
}

fn option_key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)
}

fn option_item(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        option_key,
        char(':'),
        take_till1(|c: char| c == ','),
    )(input)
}

fn option_list(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list1(delimited(space0, char(','), space0), option_item)(input)
}

/// `20` or `10-30`
fn period(input: &str) -> IResult<&str, u32> {
    let (input, (low, _)) = tuple((
        map_res(digit1, |d: &str| d.parse::<u32>()),
        opt(preceded(char('-'), digit1)),
    ))(input)?;
    Ok((input, low))
}

fn switch(key: &str, value: &str) -> Result<bool, OptionsError> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(invalid_value(key, value)),
    }
}

fn invalid_value(key: &str, value: &str) -> OptionsError {
    OptionsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl LocalConnectionOptions {
    pub fn parse(text: &str) -> Result<Self, OptionsError> {
        let text = text.trim();
        let (_, items) = all_consuming(option_list)(text).map_err(|_| OptionsError::Syntax(text.to_string()))?;

        let mut options = LocalConnectionOptions::default();
        for (key, value) in items {
            let value = value.trim();
            match key.to_ascii_lowercase().as_str() {
                "a" => {
                    let codecs: Vec<String> = value.split(';').map(|c| c.trim().to_string()).collect();
                    if codecs.iter().any(String::is_empty) {
                        return Err(invalid_value(key, value));
                    }
                    options.codecs = codecs;
                }
                "p" => {
                    let (_, ms) = all_consuming(period)(value).map_err(|_| invalid_value(key, value))?;
                    if ms == 0 {
                        return Err(invalid_value(key, value));
                    }
                    options.packetization_ms = Some(ms);
                }
                "e" => options.echo_cancellation = Some(switch(key, value)?),
                "s" => options.silence_suppression = Some(switch(key, value)?),
                _ => options.other.push((key.to_string(), value.to_string())),
            }
        }
        Ok(options)
    }

    pub fn is_empty(&self) -> bool {
        *self == LocalConnectionOptions::default()
    }

    /// Whether `format` may be offered or accepted. DTMF is always allowed.
    pub fn allows(&self, format: &MediaFormat) -> bool {
        self.codecs.is_empty()
            || format.is_dtmf()
            || self.codecs.iter().any(|codec| codec.eq_ignore_ascii_case(&format.name))
    }

    /// Restrict `formats` to the allowed codecs, reordered by preference.
    pub fn apply_preference(&self, formats: Vec<MediaFormat>) -> Vec<MediaFormat> {
        if self.codecs.is_empty() {
            return formats;
        }
        let mut ordered: Vec<MediaFormat> = Vec::with_capacity(formats.len());
        for codec in &self.codecs {
            let found = formats
                .iter()
                .find(|f| !f.is_dtmf() && f.name.eq_ignore_ascii_case(codec));
            if let Some(format) = found {
                if !ordered.iter().any(|o| o.payload_id == format.payload_id) {
                    ordered.push(format.clone());
                }
            }
        }
        ordered.extend(formats.into_iter().filter(MediaFormat::is_dtmf));
        ordered
    }
}

impl FromStr for LocalConnectionOptions {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocalConnectionOptions::parse(s)
    }
}

impl fmt::Display for LocalConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |value: bool| if value { "on" } else { "off" };
        let mut items = Vec::new();
        if !self.codecs.is_empty() {
            items.push(format!("a:{}", self.codecs.join(";")));
        }
        if let Some(ms) = self.packetization_ms {
            items.push(format!("p:{}", ms));
        }
        if let Some(value) = self.echo_cancellation {
            items.push(format!("e:{}", on_off(value)));
        }
        if let Some(value) = self.silence_suppression {
            items.push(format!("s:{}", on_off(value)));
        }
        items.extend(self.other.iter().map(|(key, value)| format!("{}:{}", key, value)));
        f.write_str(&items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_and_extension_options() {
        let options = LocalConnectionOptions::parse("a:PCMA;PCMU, p:20-30, e:on,s:off, webrtc:false").unwrap();

        assert_eq!(options.codecs, vec!["PCMA".to_string(), "PCMU".to_string()]);
        assert_eq!(options.packetization_ms, Some(20));
        assert_eq!(options.echo_cancellation, Some(true));
        assert_eq!(options.silence_suppression, Some(false));
        assert_eq!(options.other, vec![("webrtc".to_string(), "false".to_string())]);
        assert_eq!(options.to_string(), "a:PCMA;PCMU, p:20, e:on, s:off, webrtc:false");
    }

    #[test]
    fn rejects_undecodable_options() {
        for text in ["", "a", "a:", ",a:PCMU", "a:PCMU;;PCMA", "p:fast", "p:0", "e:maybe"] {
            assert!(LocalConnectionOptions::parse(text).is_err(), "{:?}", text);
        }
        assert_eq!(
            "p:x".parse::<LocalConnectionOptions>(),
            Err(OptionsError::InvalidValue {
                key: "p".to_string(),
                value: "x".to_string()
            })
        );
    }

    #[test]
    fn preference_filters_and_orders_formats() {
        let options = LocalConnectionOptions::parse("a:pcma;G729;PCMA").unwrap();
        let supported = vec![
            MediaFormat::new(0, "PCMU", 8000),
            MediaFormat::new(8, "PCMA", 8000),
            MediaFormat::new(101, "telephone-event", 8000),
        ];

        let ids: Vec<u8> = options
            .apply_preference(supported.clone())
            .iter()
            .map(|f| f.payload_id)
            .collect();
        assert_eq!(ids, vec![8, 101]);
        assert!(!options.allows(&supported[0]));
        assert!(options.allows(&supported[2]));
        assert_eq!(LocalConnectionOptions::default().apply_preference(supported.clone()), supported);
    }
}
