use crate::connection::LocalConnectionOptions;
use crate::errors::{ConnectionError, ConnectionResult};
use crate::media::{MediaDescription, RtpSession, SdpCodec, SessionDescription, SessionNegotiator};
use crate::state_table::{Action, ConnectionState, EventType};
use crate::types::{ConnectionMode, MediaFormat};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::event::{enqueue, EventPayload, ModificationOutcome, TransitionEvent};
use super::executor::{reply, StateMachine};

/// Packet time advertised in local descriptions
const DEFAULT_PTIME: u32 = 20;

/// Execute a single entry action.
///
/// `target` is the state being entered; every event an action produces is
/// stamped with it so late results are recognised as stale.
pub(crate) fn execute_action(action: Action, payload: &mut EventPayload, machine: &mut StateMachine, target: ConnectionState) {
    match action {
        Action::StoreOpenRequest => {
            if let EventPayload::Open {
                mode,
                remote_sdp,
                options,
                responder,
            } = payload.take()
            {
                let mut ctx = machine.context.write();
                ctx.mode = mode;
                ctx.remote_sdp = remote_sdp;
                ctx.options = options;
                info!("Connection {}: open requested, mode {}", ctx.id, mode);
                drop(ctx);
                machine.pending.operation = responder;
            }
        }
        Action::ParseRemoteDescription => {
            let text = machine.context.read().remote_sdp.clone().unwrap_or_default();
            let event = match parse_remote(machine.services.sdp.as_ref(), &text) {
                Ok(media) => TransitionEvent::new(EventType::ParsedRemoteSdp, EventPayload::RemoteParsed(media)),
                Err(error) => TransitionEvent::failure(error),
            };
            post(machine, event.expecting(target));
        }
        Action::StoreRemoteDescription => {
            if let EventPayload::RemoteParsed(media) = payload.take() {
                machine.context.write().remote_media = Some(media);
            }
        }
        Action::AllocateSession => {
            let (bind_address, mode) = {
                let ctx = machine.context.read();
                (ctx.bind_address, ctx.mode)
            };
            let negotiator = machine.services.negotiator.clone();
            spawn_step(machine, target, async move {
                match allocate(negotiator.as_ref(), bind_address, mode).await {
                    Ok(session) => {
                        TransitionEvent::new(EventType::AllocatedSession, EventPayload::SessionAllocated(session))
                    }
                    Err(error) => TransitionEvent::failure(error),
                }
            });
        }
        Action::StoreSession => {
            if let EventPayload::SessionAllocated(session) = payload.take() {
                let mut ctx = machine.context.write();
                debug!("Connection {}: session bound to {}", ctx.id, session.local_address());
                ctx.session = Some(session);
            }
        }
        Action::NegotiateSession => {
            let (session, remote) = {
                let ctx = machine.context.read();
                let remote = ctx.remote_media.clone().map(|mut media| {
                    media.formats = ctx.options.apply_preference(media.formats);
                    media
                });
                (ctx.session.clone(), remote)
            };
            let (Some(session), Some(remote)) = (session, remote) else {
                post(
                    machine,
                    TransitionEvent::failure(ConnectionError::malformed_offer("no remote description to negotiate"))
                        .expecting(target),
                );
                return;
            };
            let negotiator = machine.services.negotiator.clone();
            spawn_step(machine, target, async move {
                match negotiator.negotiate(&session, &remote).await {
                    Ok(formats) => {
                        TransitionEvent::new(EventType::SessionNegotiated, EventPayload::FormatsNegotiated(formats))
                    }
                    Err(error) => TransitionEvent::failure(error),
                }
            });
        }
        Action::StoreNegotiatedFormats => {
            if let EventPayload::FormatsNegotiated(formats) = payload.take() {
                machine.context.write().formats = formats;
            }
        }
        Action::GenerateLocalDescription => {
            let event = match generate_local(machine) {
                Ok(sdp) => TransitionEvent::new(EventType::GeneratedLocalSdp, EventPayload::LocalGenerated(sdp)),
                Err(error) => TransitionEvent::failure(error),
            };
            post(machine, event.expecting(target));
        }
        Action::StoreLocalDescription => {
            if let EventPayload::LocalGenerated(sdp) = payload.take() {
                machine.context.write().local_sdp = Some(sdp);
            }
        }
        Action::NotifyOpened => {
            let local_sdp = machine.context.read().local_sdp.clone().unwrap_or_default();
            reply(machine.pending.operation.take(), Ok(local_sdp));
        }
        Action::StoreModifyRequest => {
            if let EventPayload::Modify { responder, .. } = payload {
                machine.pending.operation = responder.take();
            }
        }
        Action::Renegotiate => {
            let EventPayload::Modify { mode, remote_sdp, .. } = payload.take() else {
                return;
            };
            let request = {
                let mut ctx = machine.context.write();
                let version = ctx.next_sdp_version();
                RenegotiationRequest {
                    session: ctx.session.clone(),
                    mode: mode.unwrap_or(ctx.mode),
                    remote_sdp,
                    formats: ctx.formats.clone(),
                    options: ctx.options.clone(),
                    local: LocalDescriptionParams {
                        session_id: u64::from(ctx.id.value()),
                        session_version: version,
                        address: ctx.advertised_address(),
                        port: 0,
                        ptime: ptime(&ctx.options),
                    },
                }
            };
            info!(
                "Connection {}: modifying (mode {}, new remote: {})",
                machine.context.read().id,
                request.mode,
                request.remote_sdp.is_some()
            );
            let negotiator = machine.services.negotiator.clone();
            let codec = machine.services.sdp.clone();
            spawn_step(machine, target, async move {
                match renegotiate(negotiator.as_ref(), codec.as_ref(), request).await {
                    Ok(outcome) => TransitionEvent::new(EventType::Opened, EventPayload::Modified(outcome)),
                    Err(error) => TransitionEvent::failure(error),
                }
            });
        }
        Action::ApplyModification => {
            if let EventPayload::Modified(outcome) = payload.take() {
                let mut ctx = machine.context.write();
                ctx.mode = outcome.mode;
                if let Some(remote_sdp) = outcome.remote_sdp {
                    ctx.remote_sdp = Some(remote_sdp);
                    ctx.remote_media = outcome.remote_media;
                }
                ctx.formats = outcome.formats;
                ctx.local_sdp = Some(outcome.local_sdp);
            }
        }
        Action::JoinPeer => {
            if let EventPayload::Join { peer, responder } = payload.take() {
                let mut ctx = machine.context.write();
                info!("Connection {}: joined to {}", ctx.id, peer);
                ctx.peer = Some(peer);
                drop(ctx);
                reply(responder, Ok(()));
            }
        }
        Action::ApplyLocalMode => {
            if let EventPayload::Modify { mode, responder, .. } = payload.take() {
                let mut ctx = machine.context.write();
                if let Some(mode) = mode {
                    ctx.mode = mode;
                }
                debug!("Connection {}: local mode now {}", ctx.id, ctx.mode);
                drop(ctx);
                reply(responder, Ok(String::new()));
            }
        }
        Action::RecordFailure => {
            if let EventPayload::Failure(error) = payload {
                let mut ctx = machine.context.write();
                warn!("Connection {} failed in {}: {}", ctx.id, target, error);
                ctx.last_error = Some(error.clone());
            }
        }
        Action::NotifyFailure => {
            let error = machine
                .context
                .read()
                .last_error
                .clone()
                .unwrap_or(ConnectionError::Closed);
            reply(machine.pending.operation.take(), Err(error));
        }
        Action::ReleaseSession => {
            let session = machine.context.write().session.take();
            if let Some(session) = session {
                let negotiator = machine.services.negotiator.clone();
                tokio::spawn(async move {
                    if let Err(e) = negotiator.close(&session).await {
                        warn!("Failed to release session {}: {}", session.local_address(), e);
                    }
                });
            }
        }
        Action::CancelPendingOperation => {
            if machine.pending.operation.is_some() {
                debug!("Connection {}: cancelling pending operation", machine.context.read().id);
            }
            reply(
                machine.pending.operation.take(),
                Err(ConnectionError::cancelled("connection is closing")),
            );
        }
        Action::QueueCloseResponder => {
            if let EventPayload::Close { responder } = payload.take() {
                if let Some(responder) = responder {
                    machine.pending.close_waiters.push(responder);
                }
            }
        }
        Action::CloseSession => {
            let session = machine.context.read().session.clone();
            match session {
                Some(session) => {
                    let negotiator = machine.services.negotiator.clone();
                    spawn_step(machine, target, async move {
                        match negotiator.close(&session).await {
                            Ok(()) => TransitionEvent::new(EventType::SessionClosed, EventPayload::None),
                            Err(error) => TransitionEvent::failure(error),
                        }
                    });
                }
                None => post(machine, TransitionEvent::new(EventType::Closed, EventPayload::None).expecting(target)),
            }
        }
        Action::ReleaseResources => {
            let mut ctx = machine.context.write();
            ctx.clear_media();
            ctx.peer = None;
            debug!("Connection {}: resources released", ctx.id);
        }
        Action::NotifyClosed => {
            let waiters = std::mem::take(&mut machine.pending.close_waiters);
            info!("Connection {} closed ({} waiter(s))", machine.context.read().id, waiters.len());
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
        Action::AcknowledgeClose => {
            if let EventPayload::Close { responder } = payload.take() {
                reply(responder, Ok(()));
            }
        }
    }
}

/// Queue an event produced synchronously by an action.
fn post(machine: &StateMachine, event: TransitionEvent) {
    if enqueue(&machine.events, event).is_err() {
        debug!("Connection worker gone, event dropped");
    }
}

/// Run negotiator work off the worker and queue its outcome. If the
/// connection is gone by then, a session carried by the outcome is released.
fn spawn_step<F>(machine: &StateMachine, expected: ConnectionState, step: F)
where
    F: Future<Output = TransitionEvent> + Send + 'static,
{
    let events = machine.events.clone();
    let negotiator = machine.services.negotiator.clone();
    tokio::spawn(async move {
        let event = step.await.expecting(expected);
        if let Err(undelivered) = enqueue(&events, event) {
            if let EventPayload::SessionAllocated(session) = undelivered.payload {
                let _ = negotiator.close(&session).await;
            }
        }
    });
}

async fn allocate(
    negotiator: &dyn SessionNegotiator,
    bind_address: IpAddr,
    mode: ConnectionMode,
) -> ConnectionResult<Arc<RtpSession>> {
    let session = negotiator.open(bind_address).await?;
    if let Err(error) = negotiator.update_mode(&session, mode).await {
        let _ = negotiator.close(&session).await;
        return Err(error);
    }
    Ok(session)
}

/// Parse a remote description down to its audio stream.
pub fn parse_remote(codec: &dyn SdpCodec, text: &str) -> ConnectionResult<MediaDescription> {
    let description = codec
        .parse(text)
        .map_err(|e| ConnectionError::malformed_offer(e.to_string()))?;
    description
        .audio()
        .cloned()
        .ok_or_else(|| ConnectionError::malformed_offer("no audio stream in offer"))
}

/// Inputs for rendering a local description
#[derive(Debug, Clone, Copy)]
pub struct LocalDescriptionParams {
    pub session_id: u64,
    pub session_version: u64,
    pub address: IpAddr,
    pub port: u16,
    /// `a=ptime` in milliseconds
    pub ptime: u32,
}

fn ptime(options: &LocalConnectionOptions) -> u32 {
    options.packetization_ms.unwrap_or(DEFAULT_PTIME)
}

/// Render the local description for the given formats and mode
pub fn render_local(
    codec: &dyn SdpCodec,
    params: &LocalDescriptionParams,
    formats: Vec<MediaFormat>,
    mode: ConnectionMode,
) -> String {
    let mut media = MediaDescription::audio(params.port, formats);
    media.connection_address = Some(params.address);
    media.direction = Some(mode.sdp_direction().to_string());
    media.ptime = Some(params.ptime);

    codec.render(&SessionDescription {
        origin_username: "-".to_string(),
        session_id: params.session_id.to_string(),
        session_version: params.session_version.to_string(),
        origin_address: params.address,
        session_name: "-".to_string(),
        connection_address: Some(params.address),
        media: vec![media],
    })
}

fn generate_local(machine: &StateMachine) -> ConnectionResult<String> {
    let offered = machine.services.negotiator.supported_formats();
    let mut ctx = machine.context.write();
    let session = ctx
        .session
        .clone()
        .ok_or_else(|| ConnectionError::allocation("no session bound"))?;

    // Without a remote description this is an offer of everything we
    // support, narrowed by the requested codecs.
    let formats = if ctx.remote_media.is_some() {
        ctx.formats.clone()
    } else {
        let offered = ctx.options.apply_preference(offered);
        if offered.iter().all(MediaFormat::is_dtmf) {
            return Err(ConnectionError::no_common_format(format!(
                "none of the requested codecs ({}) are supported",
                ctx.options.codecs.join(", ")
            )));
        }
        session.set_formats(offered.clone());
        ctx.formats = offered.clone();
        offered
    };

    let params = LocalDescriptionParams {
        session_id: u64::from(ctx.id.value()),
        session_version: ctx.next_sdp_version(),
        address: ctx.advertised_address(),
        port: session.local_address().port(),
        ptime: ptime(&ctx.options),
    };
    Ok(render_local(machine.services.sdp.as_ref(), &params, formats, ctx.mode))
}

struct RenegotiationRequest {
    session: Option<Arc<RtpSession>>,
    mode: ConnectionMode,
    remote_sdp: Option<String>,
    formats: Vec<MediaFormat>,
    options: LocalConnectionOptions,
    local: LocalDescriptionParams,
}

async fn renegotiate(
    negotiator: &dyn SessionNegotiator,
    codec: &dyn SdpCodec,
    request: RenegotiationRequest,
) -> ConnectionResult<ModificationOutcome> {
    let RenegotiationRequest {
        session,
        mode,
        remote_sdp,
        mut formats,
        options,
        mut local,
    } = request;
    let session = session.ok_or_else(|| ConnectionError::allocation("no session bound"))?;

    let mut remote_media = None;
    if let Some(text) = &remote_sdp {
        let media = parse_remote(codec, text)?;
        let mut preferred = media.clone();
        preferred.formats = options.apply_preference(preferred.formats);
        formats = negotiator.negotiate(&session, &preferred).await?;
        remote_media = Some(media);
    }
    negotiator.update_mode(&session, mode).await?;

    local.port = session.local_address().port();
    let local_sdp = render_local(codec, &local, formats.clone(), mode);
    Ok(ModificationOutcome {
        mode,
        remote_sdp,
        remote_media,
        formats,
        local_sdp,
    })
}
