//! `SessionController` — realtime session lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionController::new()
//!     └─► connect()       → credential fetch, handshake, pump + meter
//!         │                 spawned, status = Connected, mode = Idle
//!         └─► disconnect() → tasks aborted, transport closed,
//!                           status = Disconnected, mode = Idle
//! ```
//!
//! `Disconnected → Connecting → Connected → Disconnected`, cyclic; no
//! transition skips `Connecting`. Any failure mid-connect reverts to
//! `Disconnected` — a partially-initialized session is never retained.
//!
//! ## Concurrency
//!
//! The controller is `Send + Sync`; all fields use interior mutability, so
//! it can be shared between the host's command surface and subscribers via
//! `Arc`. One event-pump task per session consumes transport events in
//! exactly delivery order. The transcript log is only ever mutated through
//! the reconciler behind its mutex; mode and status are only ever written by
//! the publish functions here, which deduplicate notifications (exactly one
//! per distinct value) and drop publishes from tasks whose session has been
//! torn down. Tool executions run as independent
//! tasks inside the pump's `JoinSet`, so aborting the pump on disconnect
//! cancels in-flight tool calls too; a poll that abort() lets run to
//! completion can still touch the log, but never the published mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::backend::PizzaApi;
use crate::error::{ProntoError, Result};
use crate::meter::{EnergyMeter, MeterConfig, Mode, PlaybackTap};
use crate::tools::{self, ToolRegistry};
use crate::transcript::{TranscriptItem, TranscriptLog};
use crate::transport::{ClientEvent, Transport, TransportConnector, TransportEvent};

/// Broadcast channel capacity: 256 events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Connection state of the realtime channel.
///
/// Transitions happen only inside [`SessionController`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// State shared with the pump and meter tasks.
#[derive(Clone)]
struct Shared {
    log: Arc<Mutex<TranscriptLog>>,
    mode: Arc<Mutex<Mode>>,
    mode_tx: broadcast::Sender<Mode>,
    transcript_tx: broadcast::Sender<TranscriptItem>,
    /// Bumped on every disconnect; tasks from an earlier session compare
    /// their captured value and drop late publishes.
    generation: Arc<AtomicU64>,
}

impl Shared {
    /// Controller-side mode writer. Emits only actual changes.
    fn publish_mode(&self, next: Mode) {
        let mut current = self.mode.lock();
        if *current == next {
            return;
        }
        *current = next;
        let _ = self.mode_tx.send(next);
    }

    fn publish_item(&self, item: TranscriptItem) {
        let _ = self.transcript_tx.send(item);
    }
}

/// [`Shared`] as seen by one session's spawned tasks.
///
/// `abort()` does not interrupt a poll already in progress, so a pump or
/// meter poll can outlive `disconnect()` by one handler. Task publishes
/// carry the generation the task was spawned under; the check happens under
/// the mode lock, so a stale task can never overwrite the idle reset.
#[derive(Clone)]
struct TaskShared {
    shared: Shared,
    generation: u64,
}

impl TaskShared {
    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    fn publish_mode(&self, next: Mode) {
        let mut current = self.shared.mode.lock();
        if !self.is_current() || *current == next {
            return;
        }
        *current = next;
        let _ = self.shared.mode_tx.send(next);
    }

    fn publish_item(&self, item: TranscriptItem) {
        if self.is_current() {
            let _ = self.shared.transcript_tx.send(item);
        }
    }

    fn log(&self) -> &Mutex<TranscriptLog> {
        &self.shared.log
    }
}

/// Per-session resources; dropped as a unit on disconnect.
struct ActiveSession {
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
    meter_task: Option<JoinHandle<()>>,
}

/// Owns the transport handle and drives the session lifecycle.
pub struct SessionController {
    api: Arc<dyn PizzaApi>,
    connector: Arc<dyn TransportConnector>,
    meter_config: MeterConfig,
    shared: Shared,
    status: Arc<Mutex<SessionStatus>>,
    status_tx: broadcast::Sender<SessionStatus>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(
        api: Arc<dyn PizzaApi>,
        connector: Arc<dyn TransportConnector>,
        meter_config: MeterConfig,
    ) -> Self {
        let (mode_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            api,
            connector,
            meter_config,
            shared: Shared {
                log: Arc::new(Mutex::new(TranscriptLog::new())),
                mode: Arc::new(Mutex::new(Mode::Idle)),
                mode_tx,
                transcript_tx,
                generation: Arc::new(AtomicU64::new(0)),
            },
            status: Arc::new(Mutex::new(SessionStatus::Disconnected)),
            status_tx,
            active: Mutex::new(None),
        }
    }

    /// Bring the realtime channel up.
    ///
    /// No-op when already connected. Fetches an ephemeral credential, hands
    /// it to the connector for the handshake, then wires the event pump and
    /// (when a playback tap is supplied) the activity meter. Without a tap
    /// the meter degrades to idle rather than failing.
    ///
    /// The only suspension points in the whole session are the two round
    /// trips in here; neither carries a timeout, so a stalled backend leaves
    /// status at `Connecting` until the caller gives up and disconnects.
    ///
    /// # Errors
    /// Credential or handshake failures surface to the caller and revert
    /// status to `Disconnected`. Never auto-retried.
    pub async fn connect(&self, tap: Option<Box<dyn PlaybackTap>>) -> Result<()> {
        match *self.status.lock() {
            SessionStatus::Connected => {
                debug!("connect ignored; already connected");
                return Ok(());
            }
            SessionStatus::Connecting => {
                warn!("connect ignored; handshake already in flight");
                return Ok(());
            }
            SessionStatus::Disconnected => {}
        }

        self.set_status(SessionStatus::Connecting);
        info!("connecting realtime session");

        let credential = match self.api.ephemeral_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                self.set_status(SessionStatus::Disconnected);
                return Err(e);
            }
        };

        let definitions = tools::definitions();
        let (transport, events) = match self
            .connector
            .connect(credential, tools::AGENT_INSTRUCTIONS, &definitions)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                self.set_status(SessionStatus::Disconnected);
                return Err(e);
            }
        };

        let registry = Arc::new(ToolRegistry::new(Arc::clone(&self.api)));
        let task_shared = TaskShared {
            shared: self.shared.clone(),
            generation: self.shared.generation.load(Ordering::SeqCst),
        };
        let pump = tokio::spawn(run_pump(
            events,
            task_shared.clone(),
            Arc::clone(&transport),
            registry,
        ));

        let meter_task =
            tap.map(|tap| tokio::spawn(run_meter(tap, self.meter_config.clone(), task_shared)));

        *self.active.lock() = Some(ActiveSession {
            transport,
            pump,
            meter_task,
        });
        self.set_status(SessionStatus::Connected);
        self.shared.publish_mode(Mode::Idle);
        info!("realtime session connected");
        Ok(())
    }

    /// Tear the session down. Idempotent.
    ///
    /// Stops the sampling task and the event pump synchronously before
    /// returning, then closes the transport and clears the handle.
    pub fn disconnect(&self) {
        if let Some(active) = self.active.lock().take() {
            // Invalidate the session's tasks first: a poll already in
            // progress may finish, but its publishes are dropped.
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(meter_task) = active.meter_task {
                meter_task.abort();
            }
            active.pump.abort();
            active.transport.close();
            info!("realtime session disconnected");
        }
        self.shared.publish_mode(Mode::Idle);
        self.set_status(SessionStatus::Disconnected);
    }

    /// Forward a typed user message.
    ///
    /// Sets mode to listening optimistically for immediate feedback; the
    /// actual mode settles from audio/transport events afterwards.
    ///
    /// # Errors
    /// `ProntoError::NotConnected` unless status is `Connected`.
    pub async fn send_user_text(&self, text: &str) -> Result<()> {
        let transport = self.connected_transport()?;
        self.shared.publish_mode(Mode::Listening);
        transport.send_user_text(text).await
    }

    /// Cancel the in-flight assistant utterance.
    ///
    /// Mode resets to idle immediately, without waiting for confirmation.
    /// A no-op when not connected.
    pub async fn interrupt(&self) {
        self.shared.publish_mode(Mode::Idle);
        if let Ok(transport) = self.connected_transport() {
            if let Err(e) = transport.send_event(ClientEvent::ResponseCancel).await {
                warn!(error = %e, "interrupt request failed");
            }
        }
    }

    /// Push-to-talk press: clear the input audio buffer and show listening.
    pub async fn push_to_talk_start(&self) {
        let Ok(transport) = self.connected_transport() else {
            return;
        };
        self.shared.publish_mode(Mode::Listening);
        if let Err(e) = transport.send_event(ClientEvent::InputAudioBufferClear).await {
            warn!(error = %e, "push-to-talk start failed");
        }
    }

    /// Push-to-talk release: commit the buffer and request a response cycle.
    ///
    /// The speaking transition is inferred later from audio/transport
    /// events, never asserted here.
    pub async fn push_to_talk_stop(&self) {
        let Ok(transport) = self.connected_transport() else {
            return;
        };
        if let Err(e) = transport.send_event(ClientEvent::InputAudioBufferCommit).await {
            warn!(error = %e, "push-to-talk commit failed");
        }
        if let Err(e) = transport.send_event(ClientEvent::ResponseCreate).await {
            warn!(error = %e, "push-to-talk response request failed");
        }
    }

    /// Mute or unmute local input audio. A no-op when not connected.
    pub fn mute(&self, muted: bool) {
        if let Some(active) = self.active.lock().as_ref() {
            active.transport.mute(muted);
        }
    }

    /// Current connection status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Current turn-taking mode (snapshot).
    pub fn mode(&self) -> Mode {
        *self.shared.mode.lock()
    }

    /// Snapshot of the transcript log in insertion order.
    pub fn transcript(&self) -> Vec<TranscriptItem> {
        self.shared.log.lock().items().to_vec()
    }

    /// Subscribe to status changes (one notification per distinct value).
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to mode changes (one notification per distinct value).
    pub fn subscribe_mode(&self) -> broadcast::Receiver<Mode> {
        self.shared.mode_tx.subscribe()
    }

    /// Subscribe to transcript updates: each event is a snapshot of the item
    /// that was appended or changed.
    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptItem> {
        self.shared.transcript_tx.subscribe()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Sole writer of the status value. Emits only actual changes.
    fn set_status(&self, next: SessionStatus) {
        let mut current = self.status.lock();
        if *current == next {
            return;
        }
        *current = next;
        let _ = self.status_tx.send(next);
    }

    fn connected_transport(&self) -> Result<Arc<dyn Transport>> {
        if *self.status.lock() != SessionStatus::Connected {
            return Err(ProntoError::NotConnected);
        }
        self.active
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.transport))
            .ok_or(ProntoError::NotConnected)
    }
}

/// Timer-driven playback sampling. Lifetime is scoped to one session: the
/// controller aborts this task as a unit on disconnect.
async fn run_meter(mut tap: Box<dyn PlaybackTap>, config: MeterConfig, shared: TaskShared) {
    let mut meter = EnergyMeter::new(&config);
    let period = Duration::from_millis(1_000 / u64::from(config.tick_hz.max(1)));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut window = vec![0.0f32; config.window_len];

    loop {
        // One clock for ticks and decay: the tokio instant follows the
        // virtual clock under a paused test runtime and the wall clock
        // otherwise.
        let now = ticker.tick().await.into_std();
        // Clamp: a tap misreporting its write count must not kill the task.
        let n = tap.read_window(&mut window).min(window.len());
        let playing = tap.is_playing();
        if let Some(next) = meter.update(&window[..n], playing, now) {
            shared.publish_mode(next);
        }
    }
}

/// Consume transport events in exactly delivery order — nothing is
/// reordered or batched. Handlers are short and non-blocking; tool
/// executions are spawned into the `JoinSet` and complete independently.
async fn run_pump(
    mut events: mpsc::Receiver<TransportEvent>,
    shared: TaskShared,
    transport: Arc<dyn Transport>,
    registry: Arc<ToolRegistry>,
) {
    let mut tool_tasks: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    handle_event(event, &shared, &transport, &registry, &mut tool_tasks)
                }
                None => break,
            },
            Some(joined) = tool_tasks.join_next() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        warn!(error = %e, "tool task panicked");
                    }
                }
            }
        }
    }
    debug!("transport event stream ended");
}

fn handle_event(
    event: TransportEvent,
    shared: &TaskShared,
    transport: &Arc<dyn Transport>,
    registry: &Arc<ToolRegistry>,
    tool_tasks: &mut JoinSet<()>,
) {
    match event {
        TransportEvent::ItemAdded { item_id, role, text } => {
            if let Some(item) = shared.log().lock().add_message(&item_id, role, &text, false) {
                shared.publish_item(item);
            }
        }
        TransportEvent::Snapshot { items } => {
            for item in shared.log().lock().apply_snapshot(&items) {
                shared.publish_item(item);
            }
        }
        TransportEvent::InputTranscriptionDelta { item_id, delta }
        | TransportEvent::OutputTranscriptDelta { item_id, delta } => {
            if let Some(item) = shared.log().lock().apply_delta(&item_id, &delta) {
                shared.publish_item(item);
            }
        }
        TransportEvent::InputTranscriptionCompleted { item_id, transcript }
        | TransportEvent::OutputTranscriptDone { item_id, transcript } => {
            if let Some(item) = shared
                .log()
                .lock()
                .complete_transcription(&item_id, &transcript)
            {
                shared.publish_item(item);
            }
        }
        // The engine started producing audio; flip before the meter hears it.
        TransportEvent::OutputAudioDelta => shared.publish_mode(Mode::Speaking),
        TransportEvent::OutputAudioDone => {}
        // Low-latency feedback on detected user speech onset.
        TransportEvent::SpeechStarted => shared.publish_mode(Mode::Listening),
        // Let the energy rules settle the mode.
        TransportEvent::SpeechStopped => {}
        TransportEvent::ToolCall {
            call_id,
            name,
            arguments,
        } => {
            let shared = shared.clone();
            let transport = Arc::clone(transport);
            let registry = Arc::clone(registry);
            tool_tasks.spawn(async move {
                run_tool_call(call_id, name, arguments, shared, transport, registry).await;
            });
        }
        TransportEvent::Error { message } => warn!(message, "transport error event"),
    }
}

/// Execute one tool call, hand the result (or tool-level error) back to the
/// engine, and fold recognised results into the transcript. This hand-back
/// is the tool-invocation-end moment; failures never tear the session down.
async fn run_tool_call(
    call_id: String,
    name: String,
    arguments: Value,
    shared: TaskShared,
    transport: Arc<dyn Transport>,
    registry: Arc<ToolRegistry>,
) {
    match registry.dispatch(&name, &arguments).await {
        Ok(result) => {
            let output = ClientEvent::ToolOutput {
                call_id,
                output: result.clone(),
            };
            if let Err(e) = transport.send_event(output).await {
                warn!(tool = %name, error = %e, "failed to hand tool result back");
            }
            match shared.log().lock().on_tool_result(&name, &result) {
                Ok(Some(item)) => shared.publish_item(item),
                Ok(None) => {}
                Err(e) => warn!(tool = %name, error = %e, "skipping artifact"),
            }
        }
        Err(e) => {
            warn!(tool = %name, error = %e, "tool call failed");
            let output = ClientEvent::ToolOutput {
                call_id,
                output: json!({ "error": e.to_string() }),
            };
            if let Err(send_err) = transport.send_event(output).await {
                warn!(tool = %name, error = %send_err, "failed to report tool failure");
            }
        }
    }
}
