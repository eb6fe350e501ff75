//! Session state machine
//!
//! Pure transition logic for one capture: every inbound event is turned into
//! a list of effects for the connection driver to execute. The machine never
//! touches the socket itself, so each transition can be tested directly.

use crate::camera_controller::CaptureSettings;
use crate::error::{Error, Result};
use crate::ghost_protocol::{Command, Notification, ProtocolMessage, SessionToken};
use crate::photo_downloader::translate_remote_path;
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on TAKE_PHOTO re-sends after the first attempt
pub const DEFAULT_MAX_CAPTURE_RETRIES: u32 = 3;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    SessionStarting,
    ModeConfiguring,
    ResolutionConfiguring,
    Capturing,
    AwaitingNotification,
    Downloading,
    Deleting,
    SessionStopping,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::SessionStarting => "session_starting",
            SessionState::ModeConfiguring => "mode_configuring",
            SessionState::ResolutionConfiguring => "resolution_configuring",
            SessionState::Capturing => "capturing",
            SessionState::AwaitingNotification => "awaiting_notification",
            SessionState::Downloading => "downloading",
            SessionState::Deleting => "deleting",
            SessionState::SessionStopping => "session_stopping",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

/// Inputs to the machine
#[derive(Debug)]
pub enum SessionEvent {
    /// TCP connect completed
    Connected,
    /// Framed message from the camera
    Message(ProtocolMessage),
    /// Photo downloader finished
    DownloadFinished(Result<PathBuf>),
    /// Capture deadline elapsed
    TimedOut(Duration),
    /// Read/write failure or peer hang-up
    SocketError(String),
    /// Host asked for shutdown
    Shutdown,
}

/// Outputs the driver must carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ProtocolMessage),
    Download { remote_path: String },
    Close,
}

/// Retry policy for the TAKE_PHOTO step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_capture_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_capture_retries: DEFAULT_MAX_CAPTURE_RETRIES,
        }
    }
}

/// Per-connection session context
#[derive(Debug)]
pub struct SessionMachine {
    camera_id: String,
    settings: CaptureSettings,
    retry: RetryPolicy,
    state: SessionState,
    token: Option<SessionToken>,
    /// msg_id of the command whose response is outstanding
    awaiting: Option<u32>,
    capture_attempts: u32,
    remote_path: Option<String>,
    /// Unix-style relative form of `remote_path`, used for the delete
    relative_path: Option<String>,
    downloaded: Option<PathBuf>,
    error: Option<Error>,
}

impl SessionMachine {
    pub fn new(camera_id: impl Into<String>, settings: CaptureSettings, retry: RetryPolicy) -> Self {
        Self {
            camera_id: camera_id.into(),
            settings,
            retry,
            state: SessionState::Connecting,
            token: None,
            awaiting: None,
            capture_attempts: 0,
            remote_path: None,
            relative_path: None,
            downloaded: None,
            error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn capture_attempts(&self) -> u32 {
        self.capture_attempts
    }

    /// Device path of the photo, once `photo_complete` arrived
    pub fn remote_path(&self) -> Option<&str> {
        self.remote_path.as_deref()
    }

    pub fn is_downloaded(&self) -> bool {
        self.downloaded.is_some()
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.state.is_terminal() {
            tracing::debug!(
                camera_id = %self.camera_id,
                event = ?event,
                "Event after session end ignored"
            );
            return effects;
        }

        let before = self.state;

        match event {
            SessionEvent::Connected => self.on_connected(&mut effects),
            SessionEvent::Message(msg) => self.on_message(msg, &mut effects),
            SessionEvent::DownloadFinished(result) => self.on_download(result, &mut effects),
            SessionEvent::TimedOut(after) => {
                self.abort(Error::Timeout(after), &mut effects);
            }
            SessionEvent::SocketError(reason) => self.on_socket_error(reason, &mut effects),
            SessionEvent::Shutdown => {
                self.abort(Error::Cancelled("host shutdown".to_string()), &mut effects);
            }
        }

        if before != self.state {
            tracing::debug!(
                camera_id = %self.camera_id,
                from = before.as_str(),
                to = self.state.as_str(),
                "Session transition"
            );
        }

        effects
    }

    /// Final result, available once the machine is terminal
    ///
    /// A photo that was downloaded counts as success even if delete/stop
    /// failed afterwards.
    pub fn take_outcome(&mut self) -> Option<Result<PathBuf>> {
        if !self.state.is_terminal() {
            return None;
        }
        if let Some(path) = self.downloaded.take() {
            if let Some(e) = self.error.take() {
                let cleanup = Error::DeviceCleanup(e.to_string());
                tracing::warn!(
                    camera_id = %self.camera_id,
                    error = %cleanup,
                    "Photo retrieved but camera cleanup did not finish"
                );
            }
            return Some(Ok(path));
        }
        Some(Err(self.error.take().unwrap_or_else(|| {
            Error::Protocol("session ended without a photo".to_string())
        })))
    }

    fn on_connected(&mut self, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Connecting {
            return;
        }
        tracing::info!(camera_id = %self.camera_id, "Connected, sending start session");
        self.state = SessionState::SessionStarting;
        self.send(Command::StartSession, effects);
    }

    fn on_message(&mut self, msg: ProtocolMessage, effects: &mut Vec<Effect>) {
        if let Some(notification) = msg.notification() {
            self.on_notification(notification, &msg, effects);
            return;
        }

        if self.awaiting != Some(msg.msg_id) {
            tracing::debug!(
                camera_id = %self.camera_id,
                msg_id = msg.msg_id,
                state = self.state.as_str(),
                "Unexpected response ignored"
            );
            return;
        }
        self.awaiting = None;

        match self.state {
            SessionState::SessionStarting => {
                if !msg.is_success() {
                    self.fail(Error::Session {
                        message: "session start rejected".to_string(),
                        rval: msg.rval_or_default(),
                    });
                    effects.push(Effect::Close);
                    return;
                }
                match msg.param.clone().and_then(SessionToken::from_value) {
                    Some(token) => {
                        tracing::info!(camera_id = %self.camera_id, token = %token, "Started session");
                        self.token = Some(token);
                        self.state = SessionState::ModeConfiguring;
                        let cmd = Command::ApplySetting {
                            name: "capture_mode".to_string(),
                            value: self.settings.capture_mode.clone(),
                        };
                        self.send(cmd, effects);
                    }
                    None => {
                        self.fail(Error::Protocol("session start reply without token".to_string()));
                        effects.push(Effect::Close);
                    }
                }
            }
            SessionState::ModeConfiguring => {
                if msg.is_success() {
                    self.state = SessionState::ResolutionConfiguring;
                    let cmd = Command::ApplySetting {
                        name: "photo_size".to_string(),
                        value: self.settings.photo_size.clone(),
                    };
                    self.send(cmd, effects);
                } else {
                    self.stop_with(
                        Error::Session {
                            message: "capture_mode rejected".to_string(),
                            rval: msg.rval_or_default(),
                        },
                        effects,
                    );
                }
            }
            SessionState::ResolutionConfiguring => {
                if msg.is_success() {
                    self.take_photo(effects);
                } else {
                    self.stop_with(
                        Error::Session {
                            message: "photo_size rejected".to_string(),
                            rval: msg.rval_or_default(),
                        },
                        effects,
                    );
                }
            }
            SessionState::Capturing => {
                if msg.is_success() {
                    self.state = SessionState::AwaitingNotification;
                } else if self.capture_attempts <= self.retry.max_capture_retries {
                    tracing::warn!(
                        camera_id = %self.camera_id,
                        rval = msg.rval_or_default(),
                        attempt = self.capture_attempts,
                        "Take photo failed, retrying"
                    );
                    self.take_photo(effects);
                } else {
                    self.stop_with(
                        Error::CaptureFailed {
                            attempts: self.capture_attempts,
                        },
                        effects,
                    );
                }
            }
            SessionState::Deleting => {
                if !msg.is_success() {
                    tracing::warn!(
                        camera_id = %self.camera_id,
                        rval = msg.rval_or_default(),
                        "Failed to delete photo on camera"
                    );
                }
                self.state = SessionState::SessionStopping;
                self.send(Command::StopSession, effects);
            }
            SessionState::SessionStopping => {
                if msg.is_success() {
                    tracing::info!(camera_id = %self.camera_id, "Stopped session");
                } else {
                    tracing::warn!(
                        camera_id = %self.camera_id,
                        rval = msg.rval_or_default(),
                        "Failed to stop session"
                    );
                }
                self.state = SessionState::Closed;
                effects.push(Effect::Close);
            }
            _ => {}
        }
    }

    fn on_notification(&mut self, notification: Notification, msg: &ProtocolMessage, effects: &mut Vec<Effect>) {
        // photo_complete may overtake the 769 ack on some firmware
        let capturing = matches!(
            self.state,
            SessionState::Capturing | SessionState::AwaitingNotification
        );

        match notification {
            Notification::PhotoComplete if capturing => match msg.param_str() {
                Some(path) => {
                    tracing::info!(camera_id = %self.camera_id, remote_path = %path, "Photo complete");
                    self.awaiting = None;
                    match translate_remote_path(path) {
                        Ok(relative) => {
                            self.remote_path = Some(path.to_string());
                            self.relative_path = Some(relative);
                            self.state = SessionState::Downloading;
                            effects.push(Effect::Download {
                                remote_path: path.to_string(),
                            });
                        }
                        Err(e) => self.stop_with(e, effects),
                    }
                }
                None => {
                    self.stop_with(
                        Error::Protocol("photo_complete without file path".to_string()),
                        effects,
                    );
                }
            },
            Notification::IgnoreMsg if capturing => {
                tracing::warn!(camera_id = %self.camera_id, "Camera ignored take photo");
                self.awaiting = None;
                self.stop_with(
                    Error::CaptureFailed {
                        attempts: self.capture_attempts,
                    },
                    effects,
                );
            }
            other => {
                tracing::debug!(
                    camera_id = %self.camera_id,
                    notification = ?other,
                    state = self.state.as_str(),
                    "Notification ignored"
                );
            }
        }
    }

    fn on_download(&mut self, result: Result<PathBuf>, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Downloading {
            return;
        }
        match result {
            Ok(path) => {
                self.downloaded = Some(path);
                self.state = SessionState::Deleting;
                let path = self.relative_path.clone().unwrap_or_default();
                self.send(Command::DeleteFile { path }, effects);
            }
            Err(e) => {
                tracing::warn!(camera_id = %self.camera_id, error = %e, "Photo download failed");
                self.stop_with(e, effects);
            }
        }
    }

    fn on_socket_error(&mut self, reason: String, effects: &mut Vec<Effect>) {
        if self.state == SessionState::SessionStopping {
            // Peer hung up instead of acking stop; the session is over either way
            tracing::debug!(camera_id = %self.camera_id, reason = %reason, "Socket closed while stopping");
            self.state = SessionState::Closed;
            effects.push(Effect::Close);
            return;
        }
        self.abort(Error::Connection(reason), effects);
    }

    fn take_photo(&mut self, effects: &mut Vec<Effect>) {
        self.capture_attempts += 1;
        self.state = SessionState::Capturing;
        tracing::info!(
            camera_id = %self.camera_id,
            attempt = self.capture_attempts,
            "Taking photo"
        );
        self.send(Command::TakePhoto, effects);
    }

    /// Record the failure and stop the session politely
    fn stop_with(&mut self, error: Error, effects: &mut Vec<Effect>) {
        tracing::warn!(camera_id = %self.camera_id, error = %error, "Stopping session after failure");
        self.record(error);
        self.state = SessionState::SessionStopping;
        self.send(Command::StopSession, effects);
    }

    /// Record the failure and drop the connection without further commands
    fn abort(&mut self, error: Error, effects: &mut Vec<Effect>) {
        tracing::warn!(
            camera_id = %self.camera_id,
            error = %error,
            state = self.state.as_str(),
            "Session aborted"
        );
        self.fail(error);
        effects.push(Effect::Close);
    }

    fn fail(&mut self, error: Error) {
        self.record(error);
        self.state = SessionState::Failed;
        self.awaiting = None;
    }

    /// First recorded error wins
    fn record(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn send(&mut self, command: Command, effects: &mut Vec<Effect>) {
        match command.to_message(self.token.as_ref()) {
            Ok(msg) => {
                self.awaiting = Some(command.msg_id());
                effects.push(Effect::Send(msg));
            }
            Err(e) => {
                self.fail(e);
                effects.push(Effect::Close);
            }
        }
    }
}
