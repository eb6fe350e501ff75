//! Connection driver
//!
//! Owns the TCP stream, framer and state machine for a single capture and
//! carries out the machine's effects. Nothing here is shared between
//! captures.

use super::machine::{Effect, RetryPolicy, SessionEvent, SessionMachine, SessionState};
use crate::camera_controller::{CameraDescriptor, CaptureSettings};
use crate::error::{Error, Result};
use crate::ghost_protocol::{MessageFramer, ProtocolMessage};
use crate::photo_downloader::{discard_partial, PhotoDownloader};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_BUFFER_SIZE: usize = 4096;

/// One capture over one control connection
pub struct GhostSession {
    camera: CameraDescriptor,
    destination: PathBuf,
    downloader: PhotoDownloader,
    machine: SessionMachine,
    framer: MessageFramer,
    stream: Option<TcpStream>,
    closed: bool,
    commands_sent: usize,
}

impl GhostSession {
    pub fn new(
        camera: CameraDescriptor,
        destination: PathBuf,
        settings: CaptureSettings,
        retry: RetryPolicy,
        downloader: PhotoDownloader,
    ) -> Self {
        let machine = SessionMachine::new(camera.id.clone(), settings, retry);
        Self {
            camera,
            destination,
            downloader,
            machine,
            framer: MessageFramer::new(),
            stream: None,
            closed: false,
            commands_sent: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Commands written to the socket so far
    pub fn commands_sent(&self) -> usize {
        self.commands_sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Connect and drive the exchange until the machine is terminal
    ///
    /// Dropping this future part way (deadline, shutdown) leaves the session
    /// resumable only through [`GhostSession::interrupt`].
    pub async fn run(&mut self) {
        let addr = (self.camera.address.clone(), self.camera.control_port);
        tracing::info!(
            camera_id = %self.camera.id,
            address = %self.camera.address,
            port = self.camera.control_port,
            "Capturing"
        );

        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, "set_nodelay failed");
                }
                self.stream = Some(stream);
                self.dispatch(SessionEvent::Connected).await;
            }
            Err(e) => {
                self.dispatch(SessionEvent::SocketError(format!("connect failed: {}", e)))
                    .await;
                return;
            }
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        while !self.machine.state().is_terminal() {
            let read = match self.stream.as_mut() {
                Some(stream) => stream.read(&mut buf).await,
                None => break,
            };

            match read {
                Ok(0) => {
                    self.dispatch(SessionEvent::SocketError("connection closed by camera".to_string()))
                        .await;
                }
                Ok(n) => {
                    tracing::debug!(
                        camera_id = %self.camera.id,
                        chunk = %String::from_utf8_lossy(&buf[..n]),
                        "Received"
                    );
                    self.framer.push(&buf[..n]);
                    self.drain_framer().await;
                }
                Err(e) => {
                    self.dispatch(SessionEvent::SocketError(e.to_string())).await;
                }
            }
        }
    }

    /// Feed an out-of-band event (deadline, shutdown) after `run` was dropped
    pub async fn interrupt(&mut self, event: SessionEvent) {
        let was_downloading = self.machine.state() == SessionState::Downloading;
        self.dispatch(event).await;
        if was_downloading {
            discard_partial(&self.destination).await;
        }
        // the machine may have been terminal already; the socket still goes
        self.close().await;
    }

    /// Outcome once terminal
    pub fn take_outcome(&mut self) -> Option<Result<PathBuf>> {
        self.machine.take_outcome()
    }

    async fn drain_framer(&mut self) {
        while let Some(item) = self.framer.next() {
            match item.and_then(ProtocolMessage::from_value) {
                Ok(msg) => {
                    self.dispatch(SessionEvent::Message(msg)).await;
                    if self.machine.state().is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        camera_id = %self.camera.id,
                        error = %e,
                        "Dropping malformed control message"
                    );
                }
            }
        }
    }

    async fn dispatch(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            for effect in self.machine.handle(event) {
                match effect {
                    Effect::Send(msg) => {
                        if let Err(e) = self.write(&msg).await {
                            queue.push_back(SessionEvent::SocketError(e.to_string()));
                        }
                    }
                    Effect::Download { remote_path } => {
                        let result = self
                            .downloader
                            .download(&self.camera, &remote_path, &self.destination)
                            .await
                            .map(|photo| photo.local_path);
                        queue.push_back(SessionEvent::DownloadFinished(result));
                    }
                    Effect::Close => self.close().await,
                }
            }
        }
    }

    async fn write(&mut self, msg: &ProtocolMessage) -> Result<()> {
        let stream = match self.stream.as_mut() {
            Some(stream) if !self.closed => stream,
            _ => return Err(Error::Connection("write on closed connection".to_string())),
        };

        let bytes = msg.to_bytes()?;
        tracing::debug!(
            camera_id = %self.camera.id,
            msg_id = msg.msg_id,
            payload = %String::from_utf8_lossy(&bytes),
            "Sending"
        );
        stream
            .write_all(&bytes)
            .await
            .map_err(|e| Error::Connection(format!("write failed: {}", e)))?;
        self.commands_sent += 1;
        Ok(())
    }

    /// Close the control connection; later calls are no-ops
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(camera_id = %self.camera.id, error = %e, "Shutdown on close failed");
            }
            tracing::debug!(camera_id = %self.camera.id, "Closing socket");
        }
    }
}
