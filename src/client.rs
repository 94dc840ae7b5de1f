// src/client.rs - Protocol seam between the monitor and the OPC UA stack
//
// The state machine, watchdog and tests all talk to these traits; the real
// client lives behind the `opcua-support` feature and is the only module
// that touches protocol-library types.

use crate::config::SubscriptionConfig;
use crate::error::{MonitorError, Result};
use crate::event::EventSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One monitored server: address plus decrypted credentials, held only in
/// memory for the process lifetime.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerTarget {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Address of a server-side node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub namespace_index: u16,
    pub identifier: NodeIdentifier,
}

/// Node identifier variants we address (numeric object ids, string tags).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeIdentifier {
    Numeric(u32),
    String(String),
}

impl NodeRef {
    pub fn numeric(namespace_index: u16, identifier: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(identifier),
        }
    }

    pub fn string(namespace_index: u16, identifier: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(identifier.into()),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            NodeIdentifier::Numeric(n) => write!(f, "ns={};i={}", self.namespace_index, n),
            NodeIdentifier::String(s) => write!(f, "ns={};s={}", self.namespace_index, s),
        }
    }
}

/// Declared data type of a writable tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Bool,
    Float,
    Int,
    Str,
}

/// A value to write, already coerced to the tag's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Float(f64),
    Int(i64),
    Str(String),
}

impl TagValue {
    /// Coerce a configured raw string to the tag's declared type.
    pub fn coerce(raw: &str, ty: TagType) -> Result<Self> {
        match ty {
            TagType::Bool => {
                let lowered = raw.trim().to_lowercase();
                match lowered.as_str() {
                    "true" | "1" => Ok(TagValue::Bool(true)),
                    "false" | "0" => Ok(TagValue::Bool(false)),
                    other => Err(MonitorError::Config(format!(
                        "cannot coerce '{other}' to bool"
                    ))),
                }
            }
            TagType::Float => raw
                .trim()
                .parse::<f64>()
                .map(TagValue::Float)
                .map_err(|e| MonitorError::Config(format!("cannot coerce '{raw}' to float: {e}"))),
            TagType::Int => raw
                .trim()
                .parse::<i64>()
                .map(TagValue::Int)
                .map_err(|e| MonitorError::Config(format!("cannot coerce '{raw}' to int: {e}"))),
            TagType::Str => Ok(TagValue::Str(raw.to_string())),
        }
    }
}

/// Opaque server-assigned subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(pub u32);

/// Establishes sessions to one server. The returned errors must be
/// distinguishable: bad credentials, rejected identity and plain connection
/// failures are separate `MonitorError` variants.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: AlarmSession;

    async fn connect(&self, target: &ServerTarget) -> Result<Self::Session>;
}

/// A live session to one server. At most one exists per target at a time;
/// the connection manager owns it exclusively.
#[async_trait]
pub trait AlarmSession: Send {
    /// Verify the session is still usable.
    async fn check_connection(&mut self) -> Result<()>;

    /// Whether the publish channel backing the subscription is still alive.
    /// A dead channel with a live session means rebuild, not reconnect.
    fn publish_alive(&self) -> bool;

    /// Create an alarm/condition subscription delivering raw events to `sink`.
    async fn subscribe_alarms(
        &mut self,
        settings: &SubscriptionConfig,
        server_node: &NodeRef,
        condition_type: &NodeRef,
        sink: Box<dyn EventSink>,
    ) -> Result<SubscriptionHandle>;

    /// Ask the server to replay currently-active conditions into the
    /// subscription.
    async fn condition_refresh(&mut self, handle: SubscriptionHandle) -> Result<()>;

    /// Delete a subscription. Best-effort during teardown.
    async fn delete_subscription(&mut self, handle: SubscriptionHandle) -> Result<()>;

    /// Declared data type of a tag, for probe-write coercion.
    async fn read_tag_type(&mut self, tag: &str) -> Result<TagType>;

    /// Write a coerced value to a tag.
    async fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()>;

    /// Close the session. Best-effort during teardown.
    async fn disconnect(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_display() {
        assert_eq!(NodeRef::numeric(0, 2253).to_string(), "ns=0;i=2253");
        assert_eq!(
            NodeRef::string(3, "Watchdog.Heartbeat").to_string(),
            "ns=3;s=Watchdog.Heartbeat"
        );
    }

    #[test]
    fn coerce_by_declared_type() {
        assert_eq!(
            TagValue::coerce("1", TagType::Bool).unwrap(),
            TagValue::Bool(true)
        );
        assert_eq!(
            TagValue::coerce("false", TagType::Bool).unwrap(),
            TagValue::Bool(false)
        );
        assert_eq!(
            TagValue::coerce("1", TagType::Float).unwrap(),
            TagValue::Float(1.0)
        );
        assert_eq!(
            TagValue::coerce("42", TagType::Int).unwrap(),
            TagValue::Int(42)
        );
        assert_eq!(
            TagValue::coerce("1", TagType::Str).unwrap(),
            TagValue::Str("1".into())
        );
    }

    #[test]
    fn coerce_rejects_garbage() {
        assert!(TagValue::coerce("maybe", TagType::Bool).is_err());
        assert!(TagValue::coerce("fast", TagType::Float).is_err());
        assert!(TagValue::coerce("4.2", TagType::Int).is_err());
    }

    #[test]
    fn target_debug_redacts_password() {
        let target = ServerTarget {
            address: "opc.tcp://plc1:4840".into(),
            username: "svc".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
    }
}
