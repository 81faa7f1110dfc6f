//! Turn controller
//!
//! Drives one conversational turn at a time:
//!
//! ```text
//! Idle -> Capturing -> Transcribing -> Completing -> Speaking -> Idle
//! ```
//!
//! Failures never park the machine in a special state. Whatever went wrong is
//! turned into a fallback line that is appended and spoken like a real
//! answer, after which the controller is back to `Idle`.
//!
//! The controller runs as a tokio task. Front ends talk to it through a
//! [`TurnHandle`]: commands go in over a bounded mpsc channel and
//! [`TurnEvent`]s come back over a crossbeam channel that can be polled from
//! any thread.

use super::config::TurnConfig;
use crate::audio::CaptureAdapter;
use crate::fallback::{FallbackKind, Reply};
use crate::llm::{CompletionClient, ModelId};
use crate::messages::{Conversation, Message, SharedConversation};
use crate::speech::{AudioSettings, AudioSettingsUpdate, PlaybackAdapter, TranscriptionClient};
use crate::{Result, VoicepalError};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the controller is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Capturing,
    Transcribing,
    Completing,
    Speaking,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The four external collaborators of a turn
#[derive(Clone)]
pub struct Adapters {
    pub capture: Arc<dyn CaptureAdapter>,
    pub transcriber: Arc<dyn TranscriptionClient>,
    pub completer: Arc<dyn CompletionClient>,
    pub playback: Arc<dyn PlaybackAdapter>,
}

/// Commands accepted by a running controller
#[derive(Debug, Clone)]
pub enum TurnCommand {
    /// Start recording
    BeginTurn,

    /// Stop recording and process what was said
    EndTurn,

    /// `BeginTurn` when idle, `EndTurn` when recording
    ToggleTurn,

    /// Cut the current reply short
    InterruptSpeaking,

    /// Change model and start a fresh conversation
    SwitchModel(ModelId),

    /// Clear the conversation back to the greeting
    Reset,

    /// Change voice parameters for later replies
    UpdateAudioSettings(AudioSettingsUpdate),

    /// Speak the greeting
    Greet,

    /// Stop the controller
    Shutdown,
}

/// Notifications emitted by the controller
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// The turn state changed
    StateChanged { from: TurnState, to: TurnState },

    /// A message was appended to the conversation
    MessageAppended(Message),

    /// The conversation was cleared back to its greeting
    ConversationReset { model: ModelId },

    /// A different model is now in use
    ModelSwitched(ModelId),

    /// Speech output failed; the reply is still in the conversation
    PlaybackFailed(String),

    /// A command was not valid in the current state
    Rejected {
        operation: &'static str,
        state: TurnState,
    },

    /// The controller has shut down
    Shutdown,
}

/// Front-end side of a controller
#[derive(Clone)]
pub struct TurnHandle {
    command_tx: mpsc::Sender<TurnCommand>,
    event_rx: Receiver<TurnEvent>,
    state: Arc<RwLock<TurnState>>,
    conversation: SharedConversation,
    teardown: CancellationToken,
}

impl TurnHandle {
    /// Send a command to the controller
    pub async fn send(&self, command: TurnCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| VoicepalError::ChannelError(format!("Failed to send command: {}", e)))
    }

    /// Send a command without waiting for channel capacity
    pub fn try_send(&self, command: TurnCommand) -> Result<()> {
        self.command_tx
            .try_send(command)
            .map_err(|e| VoicepalError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub async fn begin_turn(&self) -> Result<()> {
        self.send(TurnCommand::BeginTurn).await
    }

    pub async fn end_turn(&self) -> Result<()> {
        self.send(TurnCommand::EndTurn).await
    }

    pub async fn toggle_turn(&self) -> Result<()> {
        self.send(TurnCommand::ToggleTurn).await
    }

    pub async fn interrupt_speaking(&self) -> Result<()> {
        self.send(TurnCommand::InterruptSpeaking).await
    }

    pub async fn switch_model(&self, model: ModelId) -> Result<()> {
        self.send(TurnCommand::SwitchModel(model)).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(TurnCommand::Reset).await
    }

    pub async fn update_audio_settings(&self, update: AudioSettingsUpdate) -> Result<()> {
        self.send(TurnCommand::UpdateAudioSettings(update)).await
    }

    pub async fn greet(&self) -> Result<()> {
        self.send(TurnCommand::Greet).await
    }

    /// Stop the controller, abandoning a transcription or completion in flight
    pub async fn shutdown(&self) -> Result<()> {
        self.teardown.cancel();
        self.send(TurnCommand::Shutdown).await
    }

    /// Try to receive an event from the controller
    pub fn try_recv_event(&self) -> Option<TurnEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Take every event that is currently queued
    pub fn drain_events(&self) -> Vec<TurnEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Get the event receiver for use on another thread
    pub fn event_receiver(&self) -> Receiver<TurnEvent> {
        self.event_rx.clone()
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        *self.state.read()
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    /// Snapshot of the conversation
    pub fn messages(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }
}

enum Wake {
    Command(Option<TurnCommand>),
    CaptureTimeout,
    PlaybackDone(std::result::Result<Result<()>, JoinError>),
}

/// Single-flight state machine coordinating capture, transcription,
/// completion and playback
pub struct TurnController {
    config: TurnConfig,
    adapters: Adapters,
    conversation: SharedConversation,
    state: Arc<RwLock<TurnState>>,
    settings: AudioSettings,
    capture_deadline: Option<Instant>,
    speaking: Option<JoinHandle<Result<()>>>,
    command_rx: mpsc::Receiver<TurnCommand>,
    event_tx: Sender<TurnEvent>,
    teardown: CancellationToken,
}

impl TurnController {
    /// Create a controller and the handle used to drive it
    pub fn new(config: TurnConfig, adapters: Adapters) -> (Self, TurnHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_buffer.max(1));

        let conversation = SharedConversation::new(Conversation::with_greeting(
            config.default_model,
            config.history_limit,
            config.greeting.clone(),
        ));
        let state = Arc::new(RwLock::new(TurnState::Idle));
        let teardown = CancellationToken::new();

        let handle = TurnHandle {
            command_tx,
            event_rx,
            state: Arc::clone(&state),
            conversation: conversation.clone(),
            teardown: teardown.clone(),
        };

        let controller = Self {
            config,
            adapters,
            conversation,
            state,
            settings: AudioSettings::default(),
            capture_deadline: None,
            speaking: None,
            command_rx,
            event_tx,
            teardown,
        };

        (controller, handle)
    }

    /// Use `settings` for playback instead of the defaults
    pub fn with_audio_settings(mut self, settings: AudioSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> TurnState {
        *self.state.read()
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    pub fn audio_settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// When an unattended recording will be ended
    pub fn capture_deadline(&self) -> Option<Instant> {
        self.capture_deadline
    }

    /// Spawn the command loop on the current tokio runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands until `Shutdown` or until every handle is dropped
    pub async fn run(mut self) {
        info!("Turn controller started with {}", self.conversation.model());

        loop {
            if self.teardown.is_cancelled() {
                self.shutdown().await;
                break;
            }

            let deadline = self.capture_deadline.unwrap_or_else(Instant::now);
            let wake = tokio::select! {
                command = self.command_rx.recv() => Wake::Command(command),
                _ = tokio::time::sleep_until(deadline), if self.capture_deadline.is_some() => {
                    Wake::CaptureTimeout
                }
                result = playback_finished(&mut self.speaking), if self.speaking.is_some() => {
                    Wake::PlaybackDone(result)
                }
            };

            match wake {
                Wake::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Wake::Command(None) => {
                    debug!("All turn handles dropped");
                    self.shutdown().await;
                    break;
                }
                Wake::CaptureTimeout => {
                    info!("Capture timed out, ending turn");
                    let result = self.end_turn().await;
                    self.log_outcome("end turn", result);
                }
                Wake::PlaybackDone(result) => {
                    self.speaking = None;
                    self.finish_playback(result);
                }
            }
        }

        info!("Turn controller stopped");
    }

    /// Returns false once the loop should stop
    async fn handle_command(&mut self, command: TurnCommand) -> bool {
        debug!("Handling {:?} in {}", command, self.state());
        match command {
            TurnCommand::BeginTurn => {
                let result = self.begin_turn().await;
                self.log_outcome("begin turn", result);
            }
            TurnCommand::EndTurn => {
                let result = self.end_turn().await;
                self.log_outcome("end turn", result);
            }
            TurnCommand::ToggleTurn => {
                let result = if self.state() == TurnState::Capturing {
                    self.end_turn().await
                } else {
                    self.begin_turn().await
                };
                self.log_outcome("toggle turn", result);
            }
            TurnCommand::InterruptSpeaking => self.interrupt_speaking(),
            TurnCommand::SwitchModel(model) => {
                let result = self.switch_model(model).await;
                self.log_outcome("switch model", result);
            }
            TurnCommand::Reset => self.reset().await,
            TurnCommand::UpdateAudioSettings(update) => self.update_audio_settings(update),
            TurnCommand::Greet => {
                let result = self.greet();
                self.log_outcome("greet", result);
            }
            TurnCommand::Shutdown => {
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    fn log_outcome(&self, operation: &str, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(VoicepalError::InvalidState { .. }) => {}
            Err(e) => warn!("Failed to {}: {}", operation, e),
        }
    }

    /// Start recording. Only valid while idle.
    ///
    /// If the microphone cannot be started the turn never reaches
    /// `Capturing`; a fallback is spoken instead and the error returned.
    pub async fn begin_turn(&mut self) -> Result<()> {
        self.require("begin a turn", &[TurnState::Idle])?;

        match self.adapters.capture.start().await {
            Ok(()) => {
                self.transition(TurnState::Capturing);
                self.capture_deadline = Some(Instant::now() + self.config.capture_timeout());
                Ok(())
            }
            Err(e) => {
                let (kind, err) = match e {
                    VoicepalError::PermissionDenied => {
                        (FallbackKind::PermissionDenied, VoicepalError::PermissionDenied)
                    }
                    other => (
                        FallbackKind::CaptureFailed,
                        VoicepalError::CaptureError(other.to_string()),
                    ),
                };
                warn!("Could not start recording: {}", err);
                self.respond(Reply::fallback(kind));
                Err(err)
            }
        }
    }

    /// Stop recording and run the rest of the turn. Only valid while
    /// capturing.
    pub async fn end_turn(&mut self) -> Result<()> {
        self.require("end a turn", &[TurnState::Capturing])?;
        self.capture_deadline = None;
        self.transition(TurnState::Transcribing);

        let clip = match self.adapters.capture.stop().await {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Could not stop recording: {}", e);
                self.respond(Reply::fallback(FallbackKind::CaptureFailed));
                return Ok(());
            }
        };

        debug!(
            "Transcribing {:.1}s of audio ({} bytes)",
            clip.duration.as_secs_f32(),
            clip.bytes.len()
        );
        let transcribed = tokio::select! {
            reply = self.adapters.transcriber.transcribe(&clip) => reply,
            _ = self.teardown.cancelled() => {
                info!("Transcription abandoned for shutdown");
                return Ok(());
            }
        };
        let transcript = match transcribed {
            Reply::Text(text) => text,
            fallback @ Reply::Fallback(_) => {
                self.respond(fallback);
                return Ok(());
            }
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            info!("Empty transcript");
            self.respond(Reply::fallback(FallbackKind::EmptyTranscript));
            return Ok(());
        }

        let message = self.conversation.write().append_user(transcript);
        self.emit(TurnEvent::MessageAppended(message));
        self.transition(TurnState::Completing);

        let (model, history) = {
            let conversation = self.conversation.read();
            (conversation.model(), conversation.snapshot())
        };
        let reply = tokio::select! {
            reply = self.adapters.completer.complete(model, &history) => reply,
            _ = self.teardown.cancelled() => {
                info!("Completion abandoned for shutdown");
                return Ok(());
            }
        };
        if let Some(kind) = reply.fallback_kind() {
            info!("Completion fell back to {}", kind);
        }

        self.respond(reply);
        Ok(())
    }

    /// Cut the current reply short. Anything but `Speaking` is a no-op.
    pub fn interrupt_speaking(&mut self) {
        if self.state() != TurnState::Speaking {
            debug!("Nothing to interrupt in {}", self.state());
            return;
        }

        self.stop_playback();
        self.transition(TurnState::Idle);
        info!("Playback interrupted");
    }

    /// Change model, start a fresh conversation and speak its greeting
    ///
    /// Rejected while a transcription or completion is in flight; a recording
    /// or reply in progress is cancelled.
    pub async fn switch_model(&mut self, model: ModelId) -> Result<()> {
        self.require(
            "switch models",
            &[TurnState::Idle, TurnState::Capturing, TurnState::Speaking],
        )?;

        self.cancel_activity().await;
        self.conversation.write().reset_with_model(model);
        info!("Switched to {}", model.display_name());
        self.emit(TurnEvent::ModelSwitched(model));
        self.emit(TurnEvent::ConversationReset { model });

        let greeting = self.conversation.read().greeting().to_string();
        self.start_speaking(greeting);
        Ok(())
    }

    /// Back to `Idle` with only the greeting left, whatever was going on
    pub async fn reset(&mut self) {
        self.cancel_activity().await;
        self.conversation.write().reset();

        let model = self.conversation.model();
        info!("Conversation reset");
        self.emit(TurnEvent::ConversationReset { model });
    }

    /// Speak the greeting. Only valid while idle.
    pub fn greet(&mut self) -> Result<()> {
        self.require("greet", &[TurnState::Idle])?;
        let greeting = self.conversation.read().greeting().to_string();
        self.start_speaking(greeting);
        Ok(())
    }

    /// Apply a partial voice change to every later reply
    pub fn update_audio_settings(&mut self, update: AudioSettingsUpdate) {
        update.apply(&mut self.settings);
        debug!("Audio settings now {:?}", self.settings);
    }

    /// Stop playback, release the microphone and announce shutdown
    pub async fn shutdown(&mut self) {
        info!("Turn controller shutting down");
        self.teardown.cancel();
        self.stop_playback();
        self.capture_deadline = None;
        if let Err(e) = self.adapters.capture.cleanup().await {
            warn!("Failed to release capture device: {}", e);
        }
        self.transition(TurnState::Idle);
        self.emit(TurnEvent::Shutdown);
    }

    /// Wait for the current reply to finish playing
    pub async fn wait_for_playback(&mut self) {
        if let Some(handle) = self.speaking.take() {
            let result = handle.await;
            self.finish_playback(result);
        }
    }

    fn require(&self, operation: &'static str, allowed: &[TurnState]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            return Ok(());
        }

        debug!("Rejected: cannot {} while {}", operation, state);
        self.emit(TurnEvent::Rejected { operation, state });
        Err(VoicepalError::InvalidState { operation, state })
    }

    /// Append `reply` as an assistant message and speak it
    fn respond(&mut self, reply: Reply) {
        let message = self.conversation.write().append_assistant(reply.into_text());
        let text = message.content().to_string();
        self.emit(TurnEvent::MessageAppended(message));
        self.start_speaking(text);
    }

    fn start_speaking(&mut self, text: String) {
        self.stop_playback();
        self.transition(TurnState::Speaking);

        let playback = Arc::clone(&self.adapters.playback);
        let settings = self.settings.clone();
        self.speaking = Some(tokio::spawn(async move {
            playback.speak(&text, &settings).await
        }));
    }

    fn finish_playback(&mut self, result: std::result::Result<Result<()>, JoinError>) {
        match result {
            Ok(Ok(())) => debug!("Playback finished"),
            Ok(Err(e)) => {
                warn!("Playback failed: {}", e);
                self.emit(TurnEvent::PlaybackFailed(e.to_string()));
            }
            Err(e) if e.is_cancelled() => debug!("Playback task cancelled"),
            Err(e) => {
                warn!("Playback task failed: {}", e);
                self.emit(TurnEvent::PlaybackFailed(e.to_string()));
            }
        }

        if self.state() == TurnState::Speaking {
            self.transition(TurnState::Idle);
        }
    }

    fn stop_playback(&mut self) {
        if let Some(handle) = self.speaking.take() {
            self.adapters.playback.stop();
            handle.abort();
        }
    }

    /// Abandon a recording or reply in progress and go back to `Idle`
    async fn cancel_activity(&mut self) {
        self.capture_deadline = None;
        match self.state() {
            TurnState::Capturing => {
                if let Err(e) = self.adapters.capture.cleanup().await {
                    warn!("Failed to discard recording: {}", e);
                }
            }
            TurnState::Speaking => self.stop_playback(),
            _ => {}
        }
        self.transition(TurnState::Idle);
    }

    fn transition(&self, to: TurnState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            debug!("Turn state {} -> {}", from, to);
            self.emit(TurnEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: TurnEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Dropped turn event: {}", e);
        }
    }
}

async fn playback_finished(
    speaking: &mut Option<JoinHandle<Result<()>>>,
) -> std::result::Result<Result<()>, JoinError> {
    match speaking.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
