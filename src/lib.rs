//! # pronto-core
//!
//! Session orchestration for a realtime voice ordering client.
//!
//! ## Architecture
//!
//! ```text
//! Host commands → SessionController ── connect ──► TransportConnector
//!                      │                                │
//!                      │                     Arc<dyn Transport> + events
//!                      │                                │
//!                      ├── event pump ◄─────────────────┘
//!                      │      │ transcript events → TranscriptLog
//!                      │      │ tool calls        → ToolRegistry → PizzaApi
//!                      │      └ audio markers     → Mode
//!                      │
//!                      └── meter task: PlaybackTap → EnergyMeter → Mode
//!                                                                   │
//!                broadcast::Sender<{SessionStatus, Mode, TranscriptItem}>
//! ```
//!
//! The controller owns the lifecycle; the transport owns the wire. Hosts
//! subscribe to the three broadcast streams and render — they never mutate
//! session state directly.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod meter;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;

// Convenience re-exports for downstream crates
pub use backend::{HttpBackend, PizzaApi};
pub use error::{ProntoError, Result};
pub use meter::{MeterConfig, Mode, PlaybackTap};
pub use session::{SessionController, SessionStatus};
pub use tools::{ToolDefinition, ToolRegistry, AGENT_INSTRUCTIONS};
pub use transcript::{ItemKind, ItemStatus, Role, TranscriptItem, TranscriptLog};
pub use transport::{ClientEvent, Transport, TransportConnector, TransportEvent};
