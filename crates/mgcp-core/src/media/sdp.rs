//! Session descriptions.
//!
//! Only the subset needed for audio offer/answer is modelled: origin,
//! connection data, `m=` lines and the `rtpmap`, `fmtp`, `ptime` and
//! direction attributes. Everything else is skipped while parsing.
//!
//! Each line is split into `<type>=<value>` and the values the codec cares
//! about are parsed with `nom` combinators.

use crate::media::codec::lookup_static_payload;
use crate::types::MediaFormat;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{alpha1, anychar, char, digit1, not_line_ending, space1},
    combinator::{all_consuming, map_res, opt, rest, verify},
    multi::many1,
    sequence::{pair, preceded, separated_pair, terminated, tuple},
};
use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    #[error("Empty session description")]
    Empty,

    #[error("Invalid SDP line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error("Missing required line: {0}")]
    MissingLine(&'static str),
}

fn invalid(line: usize, reason: impl Into<String>) -> SdpError {
    SdpError::InvalidLine {
        line,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub protocol: String,
    /// Formats in `m=` line order
    pub formats: Vec<MediaFormat>,
    /// Media-level `c=` address, or the session-level one when absent
    pub connection_address: Option<IpAddr>,
    pub direction: Option<String>,
    pub ptime: Option<u32>,
}

impl MediaDescription {
    pub fn audio(port: u16, formats: Vec<MediaFormat>) -> Self {
        MediaDescription {
            media_type: "audio".to_string(),
            port,
            protocol: "RTP/AVP".to_string(),
            formats,
            connection_address: None,
            direction: None,
            ptime: None,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("audio")
    }

    /// Where the remote party expects RTP
    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.connection_address
            .map(|address| SocketAddr::new(address, self.port))
    }

    fn format_mut(&mut self, payload_id: u8) -> Option<&mut MediaFormat> {
        self.formats.iter_mut().find(|f| f.payload_id == payload_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub origin_username: String,
    /// Numeric strings; RFC 4566 puts no bound on their size
    pub session_id: String,
    pub session_version: String,
    pub origin_address: IpAddr,
    pub session_name: String,
    pub connection_address: Option<IpAddr>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// First audio stream, if any
    pub fn audio(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.is_audio())
    }
}

/// Parses and renders session descriptions
pub trait SdpCodec: Send + Sync {
    fn parse(&self, text: &str) -> Result<SessionDescription, SdpError>;
    fn render(&self, description: &SessionDescription) -> String;
}

/// SDP codec with a `nom` grammar for the lines it understands
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSdpCodec;

impl BasicSdpCodec {
    pub fn new() -> Self {
        BasicSdpCodec
    }
}

/// `<type>=<value>`, value trimmed
fn sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, kind) = anychar(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = not_line_ending(input)?;
    Ok((input, (kind, value.trim())))
}

fn number<T: FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |digits: &str| digits.parse::<T>())(input)
}

fn payload_type(input: &str) -> IResult<&str, u8> {
    verify(number::<u8>, |id: &u8| *id <= 127)(input)
}

fn address_type(input: &str) -> IResult<&str, &str> {
    alt((tag("IP4"), tag("IP6")))(input)
}

/// `IN IP4 192.0.2.1[/ttl[/count]]`; the multicast suffix is dropped
fn connection_data(input: &str) -> IResult<&str, IpAddr> {
    let (input, (_, _, _, _, address)) = tuple((
        tag("IN"),
        space1,
        address_type,
        space1,
        map_res(take_till1(|c: char| c == '/' || c.is_whitespace()), |a: &str| a.parse::<IpAddr>()),
    ))(input)?;
    let (input, _) = opt(preceded(char('/'), rest))(input)?;
    Ok((input, address))
}

struct Origin<'a> {
    username: &'a str,
    session_id: &'a str,
    session_version: &'a str,
    address: IpAddr,
}

/// `<username> <sess-id> <sess-version> IN <addrtype> <address>`
fn origin(input: &str) -> IResult<&str, Origin<'_>> {
    let (input, (username, _, session_id, _, session_version, _, address)) = tuple((
        take_till1(|c: char| c == ' '),
        space1,
        digit1,
        space1,
        digit1,
        space1,
        connection_data,
    ))(input)?;
    Ok((
        input,
        Origin {
            username,
            session_id,
            session_version,
            address,
        },
    ))
}

/// `<media> <port>[/<count>] <proto> <fmt> ...`
fn media_line(input: &str) -> IResult<&str, MediaDescription> {
    let (input, (media_type, _, port, _, protocol, payload_ids)) = tuple((
        alpha1,
        space1,
        terminated(number::<u16>, opt(preceded(char('/'), digit1))),
        space1,
        take_till1(|c: char| c.is_whitespace()),
        many1(preceded(space1, payload_type)),
    ))(input)?;

    // Static types are known up front; rtpmap fills in dynamic ones.
    let formats = payload_ids
        .into_iter()
        .map(|id| lookup_static_payload(id).unwrap_or_else(|| MediaFormat::new(id, "", 0)))
        .collect();

    Ok((
        input,
        MediaDescription {
            media_type: media_type.to_string(),
            port,
            protocol: protocol.to_string(),
            formats,
            connection_address: None,
            direction: None,
            ptime: None,
        },
    ))
}

struct RtpMap<'a> {
    payload_id: u8,
    name: &'a str,
    clock_rate: u32,
    channels: u8,
}

/// `<payload> <encoding>/<clock>[/<channels>]`
fn rtpmap(input: &str) -> IResult<&str, RtpMap<'_>> {
    let (input, (payload_id, _, name, _, clock_rate, channels)) = tuple((
        payload_type,
        space1,
        take_till1(|c: char| c == '/'),
        char('/'),
        number::<u32>,
        opt(preceded(char('/'), number::<u8>)),
    ))(input)?;
    Ok((
        input,
        RtpMap {
            payload_id,
            name,
            clock_rate,
            channels: channels.unwrap_or(1),
        },
    ))
}

/// `<payload> <parameters>`
fn fmtp(input: &str) -> IResult<&str, (u8, &str)> {
    separated_pair(payload_type, space1, rest)(input)
}

/// `<name>[:<value>]`
fn attribute(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(take_till1(|c: char| c == ':'), opt(preceded(char(':'), rest)))(input)
}

/// Run `parser` over a whole line value.
fn parse_value<'a, O, P>(line: usize, what: &str, value: &'a str, parser: P) -> Result<O, SdpError>
where
    P: FnMut(&'a str) -> IResult<&'a str, O>,
{
    all_consuming(parser)(value)
        .map(|(_, output)| output)
        .map_err(|_| invalid(line, format!("malformed {}", what)))
}

fn apply_attribute(line: usize, media: &mut MediaDescription, value: &str) -> Result<(), SdpError> {
    let (name, argument) = parse_value(line, "attribute", value, attribute)?;
    match (name, argument) {
        ("rtpmap", Some(argument)) => {
            let map = parse_value(line, "rtpmap", argument.trim(), rtpmap)?;
            if let Some(format) = media.format_mut(map.payload_id) {
                format.name = map.name.to_string();
                format.clock_rate = map.clock_rate;
                format.channels = map.channels;
            }
        }
        ("fmtp", Some(argument)) => {
            if let Ok((id, params)) = parse_value(line, "fmtp", argument.trim(), fmtp) {
                if let Some(format) = media.format_mut(id) {
                    format.fmtp = Some(params.trim().to_string());
                }
            }
        }
        ("ptime", Some(argument)) => {
            media.ptime = argument.trim().parse().ok();
        }
        ("sendrecv" | "sendonly" | "recvonly" | "inactive", None) => {
            media.direction = Some(name.to_string());
        }
        _ => {}
    }
    Ok(())
}

impl SdpCodec for BasicSdpCodec {
    fn parse(&self, text: &str) -> Result<SessionDescription, SdpError> {
        let mut version_seen = false;
        let mut origin_line: Option<(String, String, String, IpAddr)> = None;
        let mut session_name = String::new();
        let mut session_connection: Option<IpAddr> = None;
        let mut media: Vec<MediaDescription> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let (kind, value) = sdp_line(line)
                .map(|(_, parsed)| parsed)
                .map_err(|_| invalid(line_no, "expected '<type>=<value>'"))?;

            if !version_seen && kind != 'v' {
                return Err(SdpError::MissingLine("v="));
            }

            match kind {
                'v' => {
                    if value != "0" {
                        return Err(invalid(line_no, format!("unsupported version {}", value)));
                    }
                    version_seen = true;
                }
                'o' => {
                    let parsed = parse_value(line_no, "origin", value, origin)?;
                    origin_line = Some((
                        parsed.username.to_string(),
                        parsed.session_id.to_string(),
                        parsed.session_version.to_string(),
                        parsed.address,
                    ));
                }
                's' => session_name = value.to_string(),
                'c' => {
                    let address = parse_value(line_no, "connection data", value, connection_data)?;
                    match media.last_mut() {
                        Some(current) => current.connection_address = Some(address),
                        None => session_connection = Some(address),
                    }
                }
                'm' => media.push(parse_value(line_no, "media line", value, media_line)?),
                'a' => {
                    if let Some(current) = media.last_mut() {
                        apply_attribute(line_no, current, value)?;
                    }
                }
                _ => {}
            }
        }

        if !version_seen {
            return Err(SdpError::Empty);
        }
        let (origin_username, session_id, session_version, origin_address) =
            origin_line.ok_or(SdpError::MissingLine("o="))?;

        for stream in &mut media {
            if stream.connection_address.is_none() {
                stream.connection_address = session_connection;
            }
        }

        Ok(SessionDescription {
            origin_username,
            session_id,
            session_version,
            origin_address,
            session_name,
            connection_address: session_connection,
            media,
        })
    }

    fn render(&self, description: &SessionDescription) -> String {
        fn address_line(address: &IpAddr) -> String {
            match address {
                IpAddr::V4(v4) => format!("IN IP4 {}", v4),
                IpAddr::V6(v6) => format!("IN IP6 {}", v6),
            }
        }

        let mut out = String::new();
        let _ = write!(out, "v=0\r\n");
        let _ = write!(
            out,
            "o={} {} {} {}\r\n",
            description.origin_username,
            description.session_id,
            description.session_version,
            address_line(&description.origin_address)
        );
        let name = if description.session_name.is_empty() { "-" } else { &description.session_name };
        let _ = write!(out, "s={}\r\n", name);
        if let Some(address) = &description.connection_address {
            let _ = write!(out, "c={}\r\n", address_line(address));
        }
        let _ = write!(out, "t=0 0\r\n");

        for media in &description.media {
            let ids: Vec<String> = media.formats.iter().map(|f| f.payload_id.to_string()).collect();
            let _ = write!(out, "m={} {} {} {}\r\n", media.media_type, media.port, media.protocol, ids.join(" "));
            if let Some(address) = media.connection_address.filter(|a| Some(*a) != description.connection_address) {
                let _ = write!(out, "c={}\r\n", address_line(&address));
            }
            for format in &media.formats {
                if format.name.is_empty() {
                    continue;
                }
                let _ = write!(out, "a=rtpmap:{} {}/{}", format.payload_id, format.name, format.clock_rate);
                if format.channels > 1 {
                    let _ = write!(out, "/{}", format.channels);
                }
                out.push_str("\r\n");
                if let Some(fmtp) = &format.fmtp {
                    let _ = write!(out, "a=fmtp:{} {}\r\n", format.payload_id, fmtp);
                }
            }
            if let Some(ptime) = media.ptime {
                let _ = write!(out, "a=ptime:{}\r\n", ptime);
            }
            if let Some(direction) = &media.direction {
                let _ = write!(out, "a={}\r\n", direction);
            }
        }
        out
    }
}
