//! NotificationRequest.
//!
//! Only the request is validated and stored; detecting and reporting the
//! events belongs to the media plane.

use super::packages::{parse_requested_events, parse_signal_requests};
use super::{
    concrete_endpoint, CommandContext, CommandError, CommandResult, MgcpCommand, MgcpRequest, MgcpResponse,
    Parameter, ResponseCode,
};
use crate::endpoint::NotificationRequest;
use async_trait::async_trait;

pub struct RequestNotification;

#[async_trait]
impl MgcpCommand for RequestNotification {
    fn verb(&self) -> &'static str {
        "RQNT"
    }

    async fn execute(&self, request: &MgcpRequest, context: &CommandContext) -> CommandResult<MgcpResponse> {
        let request_id = request
            .param(Parameter::RequestId)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CommandError::new(ResponseCode::ProtocolError, "Missing request identifier"))?;
        let signals = request
            .param(Parameter::SignalRequests)
            .map(parse_signal_requests)
            .transpose()?
            .unwrap_or_default();
        let events = request
            .param(Parameter::RequestedEvents)
            .map(parse_requested_events)
            .transpose()?
            .unwrap_or_default();
        let endpoint = concrete_endpoint(request, context)?;

        endpoint.set_notification_request(NotificationRequest {
            request_id: request_id.to_string(),
            notified_entity: request.param(Parameter::NotifiedEntity).map(str::to_string),
            events,
            signals,
        });

        Ok(MgcpResponse::new(ResponseCode::TransactionExecuted, request.transaction_id))
    }
}
