//! Structured event system for repofetch.
//!
//! Fetch operations report progress and diagnostics through an
//! [`EventSender`] they receive from their environment. The sender feeds an
//! [`EventBus`] that fans events out to any number of frontends (terminal,
//! JSON lines).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       repofetch-events                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │ Event Schema │  │ EventBus     │  │ Renderers            │ │
//! │  │ (typed)      │  │ (broadcast)  │  │ (CLI/JSON)           │ │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use repofetch_events::{EventBus, EventCategory, FetchEvent, JsonRenderer};
//!
//! let bus = EventBus::new();
//! tokio::spawn(JsonRenderer::new().run(bus.subscribe()));
//!
//! let sink = bus.sender().expect("bus is open");
//! sink.report("repofetch::fetch", EventCategory::Fetch(FetchEvent::Started {
//!     repository: "png".into(),
//!     kind: "http_archive".into(),
//! }));
//! ```

pub mod bus;
pub mod event;
pub mod metadata;
pub mod renderers;

pub use bus::{EventBus, EventReceiver, EventSender, SendError};
pub use event::{
    EvaluationEvent, EventCategory, EventSource, FetchEvent, OutputEvent, RepofetchEvent,
};
pub use metadata::{correlation_id, set_correlation_id};
pub use renderers::{CliRenderer, CliRendererConfig, JsonRenderer};
