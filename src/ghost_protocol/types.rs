//! Control channel message types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default TCP control port
pub const CONTROL_PORT: u16 = 7878;

/// Message ids used on the control channel
pub mod msg_id {
    pub const APPLY_SETTING: u32 = 2;
    pub const NOTIFICATION: u32 = 7;
    pub const START_SESSION: u32 = 257;
    pub const STOP_SESSION: u32 = 258;
    pub const TAKE_PHOTO: u32 = 769;
    pub const DELETE_FILE: u32 = 1281;
}

/// Opaque session token handed out by the camera on session start
///
/// Firmware versions disagree on whether this is a number or a string, so the
/// raw JSON value is kept and echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(Value);

impl SessionToken {
    /// Placeholder token sent with the session start request
    pub fn initial() -> Self {
        Self(Value::from(0))
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(_) => Some(Self(value)),
            Value::String(ref s) if !s.is_empty() => Some(Self(value)),
            _ => None,
        }
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// One JSON object on the control channel, sent or received
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub msg_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ProtocolMessage {
    /// Decode a framed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Protocol(format!("expected JSON object, got {}", value)));
        }
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("invalid message: {}", e)))
    }

    /// Serialized wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_notification(&self) -> bool {
        self.msg_id == msg_id::NOTIFICATION
    }

    /// `rval == 0`; a response without rval counts as failure
    pub fn is_success(&self) -> bool {
        self.rval == Some(0)
    }

    pub fn rval_or_default(&self) -> i64 {
        self.rval.unwrap_or(-1)
    }

    pub fn param_str(&self) -> Option<&str> {
        self.param.as_ref().and_then(Value::as_str)
    }

    pub fn notification(&self) -> Option<Notification> {
        if !self.is_notification() {
            return None;
        }
        self.kind.as_deref().map(Notification::from_type)
    }
}

/// Device-initiated notification types (`msg_id` 7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StartPhoto,
    IgnoreMsg,
    PhotoComplete,
    Other(String),
}

impl Notification {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "start_photo" => Self::StartPhoto,
            "ignore_msg" => Self::IgnoreMsg,
            "photo_complete" => Self::PhotoComplete,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Commands the driver sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartSession,
    ApplySetting { name: String, value: String },
    TakePhoto,
    DeleteFile { path: String },
    StopSession,
}

impl Command {
    pub fn msg_id(&self) -> u32 {
        match self {
            Command::StartSession => msg_id::START_SESSION,
            Command::ApplySetting { .. } => msg_id::APPLY_SETTING,
            Command::TakePhoto => msg_id::TAKE_PHOTO,
            Command::DeleteFile { .. } => msg_id::DELETE_FILE,
            Command::StopSession => msg_id::STOP_SESSION,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartSession => "SESSION_START",
            Command::ApplySetting { .. } => "SETTINGS",
            Command::TakePhoto => "TAKE_PHOTO",
            Command::DeleteFile { .. } => "DELETE",
            Command::StopSession => "SESSION_STOP",
        }
    }

    pub fn requires_token(&self) -> bool {
        !matches!(self, Command::StartSession)
    }

    /// Build the wire message, attaching the session token
    ///
    /// Fails when the command needs a token and none has been assigned yet.
    pub fn to_message(&self, token: Option<&SessionToken>) -> Result<ProtocolMessage> {
        let token = if self.requires_token() {
            Some(token.cloned().ok_or_else(|| {
                Error::Protocol(format!("{} requires a session token", self.name()))
            })?)
        } else {
            Some(SessionToken::initial())
        };

        let mut message = ProtocolMessage {
            msg_id: self.msg_id(),
            token,
            ..Default::default()
        };

        match self {
            Command::ApplySetting { name, value } => {
                message.kind = Some(name.clone());
                message.param = Some(Value::from(value.as_str()));
            }
            Command::DeleteFile { path } => {
                message.param = Some(Value::from(path.as_str()));
            }
            _ => {}
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_session_wire_form() {
        let msg = Command::StartSession.to_message(None).unwrap();
        let value: Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value, json!({"msg_id": 257, "token": 0}));
    }

    #[test]
    fn test_setting_carries_type_and_param() {
        let token = SessionToken::from_value(json!(5)).unwrap();
        let cmd = Command::ApplySetting {
            name: "capture_mode".into(),
            value: "precise quality".into(),
        };
        let value = serde_json::to_value(cmd.to_message(Some(&token)).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"msg_id": 2, "token": 5, "type": "capture_mode", "param": "precise quality"})
        );
    }

    #[test]
    fn test_command_without_token_rejected() {
        let err = Command::TakePhoto.to_message(None).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_decode_notification() {
        let msg = ProtocolMessage::from_value(
            json!({"msg_id": 7, "type": "photo_complete", "param": "//SD0/x/y.jpg"}),
        )
        .unwrap();
        assert_eq!(msg.notification(), Some(Notification::PhotoComplete));
        assert_eq!(msg.param_str(), Some("//SD0/x/y.jpg"));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(ProtocolMessage::from_value(json!([1, 2])).is_err());
        assert!(ProtocolMessage::from_value(json!({"rval": 0})).is_err());
    }

    #[test]
    fn test_token_from_value() {
        assert!(SessionToken::from_value(json!(3)).is_some());
        assert!(SessionToken::from_value(json!("abc")).is_some());
        assert!(SessionToken::from_value(json!("")).is_none());
        assert!(SessionToken::from_value(Value::Null).is_none());
    }
}
