//! `/connect` decision table
//!
//! Two pure steps: a status report maps to either a terminal reply or a
//! request to start the environment, and a start response always maps to a
//! terminal reply. The handler performs the I/O in between. The flow is
//! single-shot; a starting environment is reported as such and the client
//! polls.

use cloudshell_api::{EnvironmentState, StartOutcome, StatusReport};
use serde_json::Value;

/// Terminal outcome of one `/connect` request.
#[derive(Debug, PartialEq)]
pub enum ConnectReply {
    /// Relay the status report unchanged
    RelayStatus(StatusReport),
    /// Relay the start operation unchanged
    RelayStart(Value),
    /// Relay an upstream `error` object
    RelayError(Value),
    /// Unrecognized shape: Unknown envelope
    Unknown(String),
}

/// What to do after reading the environment status.
#[derive(Debug, PartialEq)]
pub enum ConnectAction {
    /// Environment is suspended: call `start` and pass the body to `on_started`
    StartEnvironment,
    Reply(ConnectReply),
}

pub fn on_status(report: StatusReport) -> ConnectAction {
    let reply = match report {
        StatusReport::Failed { error } => ConnectReply::RelayError(error),
        report => match report.state() {
            Some(EnvironmentState::Suspended) => return ConnectAction::StartEnvironment,
            Some(EnvironmentState::Running) | Some(EnvironmentState::Starting) => {
                ConnectReply::RelayStatus(report)
            }
            Some(other) => ConnectReply::Unknown(format!("unexpected environment state {other}")),
            None => ConnectReply::Unknown("status response carried no state".into()),
        },
    };
    ConnectAction::Reply(reply)
}

pub fn on_started(body: Value) -> ConnectReply {
    match StartOutcome::classify(&body) {
        StartOutcome::Failed(error) => ConnectReply::RelayError(error),
        StartOutcome::Starting => ConnectReply::RelayStart(body),
        StartOutcome::Unrecognized => {
            ConnectReply::Unknown(format!("unrecognized start response: {body}"))
        }
    }
}
