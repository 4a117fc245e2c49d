//! Data-plane types: service identity and published status records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque client identifier minted by the control plane.
///
/// Doubles as the pub/sub topic: a subscriber receives exactly the records
/// whose first frame equals its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The topic frame for this client.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monitored service, identified by its (host, port) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddr {
    pub host: String,
    pub port: u16,
}

impl ServiceAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// `host:port` form accepted by connect calls.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Reachability verdict for one probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => write!(f, "UP"),
            Status::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for Status {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Status::Up),
            "DOWN" => Ok(Status::Down),
            other => Err(FrameError::BadStatus(other.to_owned())),
        }
    }
}

/// Decoding failures for the three-frame status message.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("expected 3 frames, got {0}")]
    FrameCount(usize),
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("service descriptor frame: {0}")]
    Descriptor(#[from] serde_json::Error),
    #[error("unknown status {0:?}")]
    BadStatus(String),
}

/// One published liveness observation for a (service, client) binding.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub client_id: ClientId,
    pub service: ServiceAddr,
    pub status: Status,
}

impl StatusRecord {
    pub fn new(client_id: ClientId, service: ServiceAddr, status: Status) -> Self {
        Self { client_id, service, status }
    }

    /// Encode as the multipart message `[topic, service JSON, status]`.
    pub fn to_frames(&self) -> Result<[Vec<u8>; 3], serde_json::Error> {
        Ok([
            self.client_id.as_bytes().to_vec(),
            serde_json::to_vec(&self.service)?,
            self.status.to_string().into_bytes(),
        ])
    }

    /// Decode a received multipart message.
    pub fn from_frames(frames: &[Vec<u8>]) -> Result<Self, FrameError> {
        let [topic, descriptor, status] = frames else {
            return Err(FrameError::FrameCount(frames.len()));
        };
        Ok(Self {
            client_id: ClientId::from(String::from_utf8(topic.clone())?),
            service: serde_json::from_slice(descriptor)?,
            status: String::from_utf8(status.clone())?.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_frames() {
        let record = StatusRecord::new(
            ClientId::from("c1"),
            ServiceAddr::new("127.0.0.1", 9999),
            Status::Down,
        );
        let frames = record.to_frames().unwrap();
        assert_eq!(frames[0], b"c1");
        assert_eq!(frames[2], b"DOWN");
        assert_eq!(StatusRecord::from_frames(&frames).unwrap(), record);
    }

    #[test]
    fn topic_frame_is_the_client_id() {
        let record = StatusRecord::new(
            ClientId::from("7bda3c6a"),
            ServiceAddr::new("10.1.2.3", 80),
            Status::Up,
        );
        let frames = record.to_frames().unwrap();
        assert!(frames[0].starts_with(b"7bda3c6a"));
    }

    #[test]
    fn short_message_is_rejected() {
        let frames = vec![b"c1".to_vec(), b"UP".to_vec()];
        assert!(matches!(
            StatusRecord::from_frames(&frames),
            Err(FrameError::FrameCount(2))
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let frames = vec![
            b"c1".to_vec(),
            br#"{"host":"h","port":1}"#.to_vec(),
            b"DEGRADED".to_vec(),
        ];
        assert!(matches!(
            StatusRecord::from_frames(&frames),
            Err(FrameError::BadStatus(_))
        ));
    }
}
