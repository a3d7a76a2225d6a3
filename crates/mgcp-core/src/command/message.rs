//! Parsed MGCP requests and the responses built for them.

use super::response::ResponseCode;
use std::fmt;

/// MGCP parameter lines understood by the command handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    CallId,
    ConnectionId,
    SecondConnectionId,
    Mode,
    NotifiedEntity,
    RequestId,
    RequestedEvents,
    SignalRequests,
    RequestedInfo,
    SpecificEndpoint,
    SecondEndpoint,
    ConnectionParameters,
    LocalConnectionOptions,
}

impl Parameter {
    pub fn code(&self) -> &'static str {
        match self {
            Parameter::CallId => "C",
            Parameter::ConnectionId => "I",
            Parameter::SecondConnectionId => "I2",
            Parameter::Mode => "M",
            Parameter::NotifiedEntity => "N",
            Parameter::RequestId => "X",
            Parameter::RequestedEvents => "R",
            Parameter::SignalRequests => "S",
            Parameter::RequestedInfo => "F",
            Parameter::SpecificEndpoint => "Z",
            Parameter::SecondEndpoint => "Z2",
            Parameter::ConnectionParameters => "P",
            Parameter::LocalConnectionOptions => "L",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let parameter = match code.trim().to_ascii_uppercase().as_str() {
            "C" => Parameter::CallId,
            "I" => Parameter::ConnectionId,
            "I2" => Parameter::SecondConnectionId,
            "M" => Parameter::Mode,
            "N" => Parameter::NotifiedEntity,
            "X" => Parameter::RequestId,
            "R" => Parameter::RequestedEvents,
            "S" => Parameter::SignalRequests,
            "F" => Parameter::RequestedInfo,
            "Z" => Parameter::SpecificEndpoint,
            "Z2" => Parameter::SecondEndpoint,
            "P" => Parameter::ConnectionParameters,
            "L" => Parameter::LocalConnectionOptions,
            _ => return None,
        };
        Some(parameter)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A request as handed over by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct MgcpRequest {
    pub verb: String,
    pub transaction_id: u32,
    pub endpoint_id: String,
    pub parameters: Vec<(Parameter, String)>,
    /// Session description carried after the blank line
    pub sdp: Option<String>,
}

impl MgcpRequest {
    pub fn new(verb: impl Into<String>, transaction_id: u32, endpoint_id: impl Into<String>) -> Self {
        MgcpRequest {
            verb: verb.into(),
            transaction_id,
            endpoint_id: endpoint_id.into(),
            parameters: Vec::new(),
            sdp: None,
        }
    }

    pub fn with_param(mut self, parameter: Parameter, value: impl Into<String>) -> Self {
        self.parameters.push((parameter, value.into()));
        self
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = Some(sdp.into());
        self
    }

    /// First value of `parameter`, trimmed
    pub fn param(&self, parameter: Parameter) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, value)| value.trim())
    }

    pub fn has_param(&self, parameter: Parameter) -> bool {
        self.param(parameter).is_some()
    }

    /// The attached description, ignoring an empty body
    pub fn session_description(&self) -> Option<&str> {
        self.sdp.as_deref().filter(|sdp| !sdp.trim().is_empty())
    }
}

/// The single response produced for a request
#[derive(Debug, Clone, PartialEq)]
pub struct MgcpResponse {
    pub code: ResponseCode,
    pub transaction_id: u32,
    pub message: String,
    pub parameters: Vec<(Parameter, String)>,
    pub sdp: Option<String>,
}

impl MgcpResponse {
    pub fn new(code: ResponseCode, transaction_id: u32) -> Self {
        MgcpResponse {
            code,
            transaction_id,
            message: code.default_message().to_string(),
            parameters: Vec::new(),
            sdp: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_param(mut self, parameter: Parameter, value: impl Into<String>) -> Self {
        self.parameters.push((parameter, value.into()));
        self
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = Some(sdp.into());
        self
    }

    pub fn param(&self, parameter: Parameter) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl fmt::Display for MgcpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.code.code(), self.transaction_id, self.message)?;
        for (parameter, value) in &self.parameters {
            write!(f, "{}: {}\r\n", parameter, value)?;
        }
        if let Some(sdp) = &self.sdp {
            write!(f, "\r\n{}", sdp)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_codes() {
        for parameter in [
            Parameter::CallId,
            Parameter::SecondConnectionId,
            Parameter::SecondEndpoint,
            Parameter::RequestedInfo,
            Parameter::LocalConnectionOptions,
        ] {
            assert_eq!(Parameter::from_code(parameter.code()), Some(parameter));
        }
        assert_eq!(Parameter::from_code("z2"), Some(Parameter::SecondEndpoint));
        assert_eq!(Parameter::from_code("Q"), None);
    }

    #[test]
    fn response_text() {
        let response = MgcpResponse::new(ResponseCode::TransactionExecuted, 1001)
            .with_param(Parameter::ConnectionId, "1F")
            .with_sdp("v=0\r\n");

        assert_eq!(response.to_string(), "200 1001 Transaction executed\r\nI: 1F\r\n\r\nv=0\r\n");
        assert_eq!(response.param(Parameter::ConnectionId), Some("1F"));
    }

    #[test]
    fn blank_body_is_no_description() {
        let request = MgcpRequest::new("CRCX", 1, "mobicents/ivr/1").with_sdp("  \r\n");
        assert_eq!(request.session_description(), None);
    }
}
