//! Control-plane request and reply messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::ClientId;

/// A request from a client to the control plane.
///
/// The `header` field on the wire selects the variant; anything that does
/// not parse into one of these is answered with [`Reply::InvalidHeader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Mint a new client id and an empty service list.
    RegisterClient,
    /// Start monitoring (service_host, service_port) for `client_id`,
    /// probing every `poll_freq` seconds.
    RegisterService {
        service_host: String,
        service_port: u16,
        poll_freq: u64,
        client_id: ClientId,
    },
    /// Declare a maintenance window during which the service's
    /// unreachability must not be reported to `client_id`.
    SetOutageTime {
        service_host: String,
        service_port: u16,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        client_id: ClientId,
    },
    /// Debounce DOWN transitions for all of the client's services.
    /// A non-positive value cancels the debounce.
    SetGraceTime { grace_time: i64, client_id: ClientId },
}

/// The control plane's reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    Failure {
        err: String,
    },
    InvalidHeader,
}

impl Reply {
    /// Plain success with no payload.
    pub fn success() -> Self {
        Reply::Success { client_id: None }
    }

    /// Success carrying a freshly minted client id.
    pub fn registered(client_id: ClientId) -> Self {
        Reply::Success { client_id: Some(client_id) }
    }

    pub fn failure(err: impl Into<String>) -> Self {
        Reply::Failure { err: err.into() }
    }
}
