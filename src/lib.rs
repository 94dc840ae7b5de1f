//! UAMON - OPC UA alarm monitoring and SMS notification daemon
//!
//! Connects to a fleet of OPC UA servers, subscribes to alarm/condition
//! events, suppresses repeats of already-open conditions and routes fresh
//! alarms to on-call personnel according to per-person schedules, severity
//! bands and keyword filters. Outbound notifications are serialized through
//! a single dispatch worker to respect SMS gateway rate limits.
//!
//! The daemon has no external API; its observable effects are log entries
//! and outbound sends. A process supervisor is expected to restart it on
//! fatal exit.
//!
//! # Feature Flags
//!
//! - `opcua-support` — the real OPC UA client backend. Without it the crate
//!   builds the full state machine and routing logic against the session
//!   seam in [`client`], which is what the test suite exercises.

// ============================================================================
// CORE MODULES (always available)
// ============================================================================

/// Error types and recoverable/fatal classification
pub mod error;

/// Daemon configuration (YAML)
pub mod config;

/// Sealed credential file handling
pub mod secrets;

/// Recipient phone book and routing rules
pub mod directory;

/// Raw event model, alarm record normalization and the event sink seam
pub mod event;

/// Recurrence suppression for open conditions
pub mod dedup;

/// Notification routing engine
pub mod router;

/// Serialized outbound dispatch queue
pub mod dispatch;

/// Twilio SMS transport and the log-only fallback
pub mod twilio;

/// Protocol seam: session factory and session traits
pub mod client;

/// Per-server connection/subscription state machine
pub mod monitor;

/// Independent write-probe watchdog
pub mod watchdog;

// ============================================================================
// PROTOCOL BACKEND (feature-gated)
// ============================================================================

/// OPC UA client backend wired to the session seam
#[cfg(feature = "opcua-support")]
pub mod opcua;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use client::{AlarmSession, NodeRef, ServerTarget, SessionFactory, SubscriptionHandle, TagType, TagValue};
pub use config::{Config, SubscriptionConfig};
pub use dedup::RecurrenceSet;
pub use directory::{Recipient, RecipientDirectory, RoutingRule, WordFilter};
pub use dispatch::{run_worker, DispatchItem, DispatchQueue, SmsTransport};
pub use error::{ErrorClass, MonitorError, Result};
pub use event::{normalize, AckState, ActiveState, AlarmRecord, DisplayText, EventSink, RawAlarmEvent};
pub use monitor::{AlarmMonitor, AlarmPipeline, SessionState};
pub use router::route;
pub use twilio::{LogOnlySms, TwilioConfig, TwilioSms};
pub use watchdog::Watchdog;

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
