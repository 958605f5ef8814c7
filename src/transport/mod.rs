//! Transport abstraction for the realtime channel.
//!
//! The transport carries audio and structured events between this client and
//! the remote conversational engine. The orchestrator owns the *lifecycle*
//! of the channel, not its encoding: connectors hide the actual wire
//! (WebRTC, WebSocket, an in-process mock in tests) behind two traits, so
//! the orchestrator and its tests never depend on a concrete stack.

pub mod events;

pub use events::{ClientEvent, TransportEvent};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::EphemeralCredential;
use crate::error::Result;
use crate::tools::ToolDefinition;

/// A live, handshaken realtime channel.
///
/// All methods are safe to call concurrently; `close` is idempotent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Forward a typed user message as a conversation turn.
    async fn send_user_text(&self, text: &str) -> Result<()>;

    /// Send a structured client event.
    async fn send_event(&self, event: ClientEvent) -> Result<()>;

    /// Mute or unmute the local input audio.
    fn mute(&self, muted: bool);

    /// Tear the channel down. Idempotent and synchronous.
    fn close(&self);
}

/// Builds transport sessions.
///
/// `connect` performs the handshake with the ephemeral credential and the
/// fixed agent configuration (instructions plus tool definitions), returning
/// the live handle plus the ordered event stream. The credential is
/// consumed — it authorizes exactly one handshake and is never cached.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        credential: EphemeralCredential,
        instructions: &str,
        tools: &[ToolDefinition],
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)>;
}
