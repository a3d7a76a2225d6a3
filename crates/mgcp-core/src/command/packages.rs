//! Event packages accepted in notification requests.

use super::response::{CommandError, CommandResult, ResponseCode};
use crate::endpoint::RequestedEvent;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Events and signals a package defines
#[derive(Debug)]
pub struct EventPackage {
    pub name: &'static str,
    pub events: &'static [&'static str],
    pub signals: &'static [&'static str],
}

impl EventPackage {
    pub fn has_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e.eq_ignore_ascii_case(event))
    }

    pub fn has_signal(&self, signal: &str) -> bool {
        self.signals.iter().any(|s| s.eq_ignore_ascii_case(signal))
    }
}

const DTMF_TONES: &[&str] = &[
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "*", "#", "A", "B", "C", "D",
];

static PACKAGES: Lazy<HashMap<&'static str, EventPackage>> = Lazy::new(|| {
    [
        EventPackage {
            name: "AU",
            events: &["oc", "of"],
            signals: &["pa", "pc", "pr", "es"],
        },
        EventPackage {
            name: "D",
            events: DTMF_TONES,
            signals: DTMF_TONES,
        },
        EventPackage {
            name: "R",
            events: &["rto"],
            signals: &[],
        },
    ]
    .into_iter()
    .map(|package| (package.name, package))
    .collect()
});

/// Actions a call agent may attach to a requested event
const ACTIONS: &[&str] = &["N", "A", "D", "S", "I", "K"];

pub fn lookup_package(name: &str) -> Option<&'static EventPackage> {
    PACKAGES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, package)| package)
}

/// Split a list on commas that are not inside parentheses
pub fn split_list(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in value.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(value[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    items.push(value[start..].trim());
    items.into_iter().filter(|item| !item.is_empty()).collect()
}

/// Break `pkg/name(args)` into its parts
fn split_item(item: &str) -> CommandResult<(&str, &str, Option<&str>)> {
    let (package, rest) = item
        .split_once('/')
        .ok_or_else(|| CommandError::new(ResponseCode::ProtocolError, format!("Missing package in {}", item)))?;
    let (name, args) = match rest.split_once('(') {
        Some((name, args)) => {
            let args = args.strip_suffix(')').ok_or_else(|| {
                CommandError::new(ResponseCode::ProtocolError, format!("Unbalanced parentheses in {}", item))
            })?;
            (name, Some(args))
        }
        None => (rest, None),
    };
    if package.is_empty() || name.is_empty() {
        return Err(CommandError::new(ResponseCode::ProtocolError, format!("Malformed item {}", item)));
    }
    Ok((package.trim(), name.trim(), args.map(str::trim)))
}

fn resolve_package(name: &str) -> CommandResult<&'static EventPackage> {
    lookup_package(name)
        .ok_or_else(|| CommandError::new(ResponseCode::UnknownPackage, format!("Unknown package {}", name)))
}

/// Parse the `R` parameter; an event without an action defaults to notify.
pub fn parse_requested_events(value: &str) -> CommandResult<Vec<RequestedEvent>> {
    split_list(value)
        .into_iter()
        .map(|item| {
            let (package_name, event, action) = split_item(item)?;
            let package = resolve_package(package_name)?;
            if !package.has_event(event) {
                return Err(CommandError::new(
                    ResponseCode::NoSuchEventOrSignal,
                    format!("No event {} in package {}", event, package.name),
                ));
            }
            let action = action.unwrap_or("N").to_ascii_uppercase();
            if !ACTIONS.contains(&action.as_str()) {
                return Err(CommandError::new(
                    ResponseCode::EventOrSignalParameterError,
                    format!("Unsupported action {} for {}", action, item),
                ));
            }
            Ok(RequestedEvent {
                package: package.name.to_string(),
                event: event.to_string(),
                action,
            })
        })
        .collect()
}

/// Parse the `S` parameter, keeping each signal as written
pub fn parse_signal_requests(value: &str) -> CommandResult<Vec<String>> {
    split_list(value)
        .into_iter()
        .map(|item| {
            let (package_name, signal, _) = split_item(item)?;
            let package = resolve_package(package_name)?;
            if !package.has_signal(signal) {
                return Err(CommandError::new(
                    ResponseCode::NoSuchEventOrSignal,
                    format!("No signal {} in package {}", signal, package.name),
                ));
            }
            Ok(item.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_events_with_actions() {
        let events = parse_requested_events("AU/oc(N), AU/of(n),D/5").unwrap();
        assert_eq!(
            events,
            vec![
                RequestedEvent {
                    package: "AU".into(),
                    event: "oc".into(),
                    action: "N".into()
                },
                RequestedEvent {
                    package: "AU".into(),
                    event: "of".into(),
                    action: "N".into()
                },
                RequestedEvent {
                    package: "D".into(),
                    event: "5".into(),
                    action: "N".into()
                },
            ]
        );
    }

    #[test]
    fn event_errors_carry_codes() {
        let code = |value: &str| parse_requested_events(value).unwrap_err().code;
        assert_eq!(code("XY/oc(N)"), ResponseCode::UnknownPackage);
        assert_eq!(code("AU/zz(N)"), ResponseCode::NoSuchEventOrSignal);
        assert_eq!(code("AU/oc(Q)"), ResponseCode::EventOrSignalParameterError);
        assert_eq!(code("oc"), ResponseCode::ProtocolError);
    }

    #[test]
    fn signals_keep_parameters() {
        let signals = parse_signal_requests("AU/pa(an=welcome.wav it=2),AU/es").unwrap();
        assert_eq!(signals, vec!["AU/pa(an=welcome.wav it=2)", "AU/es"]);
        assert_eq!(
            parse_signal_requests("AU/xx").unwrap_err().code,
            ResponseCode::NoSuchEventOrSignal
        );
    }
}
