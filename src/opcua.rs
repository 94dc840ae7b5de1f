// src/opcua.rs - OPC UA session adapter (enabled by the `opcua-support` feature)
//
// The only module that touches opcua-library types. Everything it hands
// upstream goes through the `RawAlarmEvent` model, so the monitor and the
// tests never depend on this feature.

use crate::client::{
    AlarmSession, NodeIdentifier, NodeRef, ServerTarget, SessionFactory, SubscriptionHandle,
    TagType, TagValue,
};
use crate::config::SubscriptionConfig;
use crate::error::{MonitorError, Result};
use crate::event::{DisplayText, EventSink, RawAlarmEvent};
use async_trait::async_trait;
use opcua::client::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// ConditionType and its ConditionRefresh method, per OPC UA part 9.
const CONDITION_TYPE_NODE: u32 = 2782;
const CONDITION_REFRESH_METHOD: u32 = 3875;

/// Event attributes requested from the server, in select-clause order.
/// `parse_event_fields` indexes results by this list, with the condition
/// node id appended as one extra clause.
const EVENT_FIELDS: [&str; 10] = [
    "Message",
    "Time",
    "Severity",
    "SuppressedOrShelved",
    "AckedState",
    "ConditionClassId",
    "Quality",
    "Retain",
    "ActiveState",
    "EnabledState",
];

pub struct OpcUaSessionFactory {
    connect_timeout_secs: u64,
}

impl OpcUaSessionFactory {
    pub fn new(connect_timeout_secs: u64) -> Self {
        Self {
            connect_timeout_secs,
        }
    }
}

#[async_trait]
impl SessionFactory for OpcUaSessionFactory {
    type Session = OpcUaSession;

    async fn connect(&self, target: &ServerTarget) -> Result<OpcUaSession> {
        let client = ClientBuilder::new()
            .application_name("uamon")
            .application_uri("urn:uamon")
            .product_uri("urn:uamon")
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .session_retry_limit(0)
            .session_timeout((self.connect_timeout_secs * 1000) as u32)
            .client();
        let mut client = client.ok_or_else(|| {
            MonitorError::Connection(format!("invalid client configuration for {}", target.address))
        })?;

        let endpoint: EndpointDescription = (
            target.address.as_str(),
            SecurityPolicy::None.to_str(),
            MessageSecurityMode::None,
            UserTokenPolicy::anonymous(),
        )
            .into();
        let identity = IdentityToken::UserName(target.username.clone(), target.password.clone());
        let session = client
            .connect_to_endpoint(endpoint, identity)
            .map_err(|status| connect_error(&target.address, status))?;

        let stop = Session::run_async(session.clone());
        debug!(address = %target.address, "session established");
        Ok(OpcUaSession {
            address: target.address.clone(),
            session,
            stop: Some(stop),
            publish_alive: Arc::new(AtomicBool::new(true)),
        })
    }
}

pub struct OpcUaSession {
    address: String,
    session: Arc<opcua::sync::RwLock<Session>>,
    stop: Option<tokio::sync::oneshot::Sender<SessionCommand>>,
    publish_alive: Arc<AtomicBool>,
}

#[async_trait]
impl AlarmSession for OpcUaSession {
    async fn check_connection(&mut self) -> Result<()> {
        // Reading ServerStatus.State exercises the whole request path, so a
        // half-dead transport fails here instead of on the next alarm.
        let state_node = NodeId::new(0, VariableId::Server_ServerStatus_State as u32);
        let session = self.session.read();
        let results = session
            .read(&[state_node.into()], TimestampsToReturn::Neither, 0.0)
            .map_err(|status| service_error(&self.address, status))?;
        match results.first().and_then(|dv| dv.status) {
            Some(status) if status.is_good() => Ok(()),
            Some(status) => Err(service_error(&self.address, status)),
            None => Err(MonitorError::Connection(format!(
                "{}: server status read returned no value",
                self.address
            ))),
        }
    }

    fn publish_alive(&self) -> bool {
        self.publish_alive.load(Ordering::Relaxed)
    }

    async fn subscribe_alarms(
        &mut self,
        settings: &SubscriptionConfig,
        server_node: &NodeRef,
        condition_type: &NodeRef,
        sink: Box<dyn EventSink>,
    ) -> Result<SubscriptionHandle> {
        let sink = Arc::new(Mutex::new(sink));
        let mut session = self.session.write();

        self.publish_alive.store(true, Ordering::Relaxed);
        let alive = Arc::clone(&self.publish_alive);
        let status_sink = Arc::clone(&sink);
        session.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
            alive.store(connected, Ordering::Relaxed);
            if let Ok(mut sink) = status_sink.lock() {
                sink.status_change(if connected { "connected" } else { "connection lost" });
            }
        }));

        let event_sink = Arc::clone(&sink);
        let callback = EventCallback::new(move |events: &EventNotificationList| {
            let Some(notified) = events.events.as_ref() else {
                return;
            };
            for field_list in notified {
                let Some(fields) = field_list.event_fields.as_ref() else {
                    continue;
                };
                let event = parse_event_fields(fields);
                if let Ok(mut sink) = event_sink.lock() {
                    sink.event(event);
                }
            }
        });

        let subscription_id = session
            .create_subscription(
                settings.publishing_interval_ms as f64,
                settings.lifetime_count,
                settings.max_keep_alive_count,
                settings.max_notifications_per_publish,
                settings.priority,
                settings.publishing_enabled,
                callback,
            )
            .map_err(|status| subscribe_error(&self.address, status))?;

        let filter = event_filter(condition_type);
        let item = MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId {
                node_id: to_node_id(server_node),
                attribute_id: AttributeId::EventNotifier as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            },
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: 1,
                sampling_interval: 0.0,
                filter: ExtensionObject::from_encodable(
                    ObjectId::EventFilter_Encoding_DefaultBinary,
                    &filter,
                ),
                queue_size: 0,
                discard_oldest: true,
            },
        };
        let results = session
            .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[item])
            .map_err(|status| subscribe_error(&self.address, status))?;
        if let Some(result) = results.first() {
            if !result.status_code.is_good() {
                return Err(subscribe_error(&self.address, result.status_code));
            }
        }
        Ok(SubscriptionHandle(subscription_id))
    }

    async fn condition_refresh(&mut self, handle: SubscriptionHandle) -> Result<()> {
        let request = CallMethodRequest {
            object_id: NodeId::new(0, CONDITION_TYPE_NODE),
            method_id: NodeId::new(0, CONDITION_REFRESH_METHOD),
            input_arguments: Some(vec![Variant::UInt32(handle.0)]),
        };
        let session = self.session.read();
        session
            .call(request)
            .map_err(|status| subscribe_error(&self.address, status))?;
        Ok(())
    }

    async fn delete_subscription(&mut self, handle: SubscriptionHandle) -> Result<()> {
        let session = self.session.read();
        session
            .delete_subscription(handle.0)
            .map_err(|status| service_error(&self.address, status))?;
        Ok(())
    }

    async fn read_tag_type(&mut self, tag: &str) -> Result<TagType> {
        let node_id = parse_tag(&self.address, tag)?;
        let session = self.session.read();
        let results = session
            .read(&[node_id.into()], TimestampsToReturn::Neither, 0.0)
            .map_err(|status| service_error(&self.address, status))?;
        let variant = results
            .first()
            .and_then(|dv| dv.value.as_ref())
            .ok_or_else(|| {
                MonitorError::Connection(format!("{}: tag {tag} has no value", self.address))
            })?;
        tag_type_of(variant).ok_or_else(|| {
            MonitorError::Config(format!(
                "tag {tag} has unsupported data type {:?}",
                variant.type_id()
            ))
        })
    }

    async fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()> {
        let node_id = parse_tag(&self.address, tag)?;
        let write = WriteValue {
            node_id,
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: DataValue::value_only(to_variant(value)),
        };
        let session = self.session.read();
        let results = session
            .write(&[write])
            .map_err(|status| service_error(&self.address, status))?;
        match results.first() {
            Some(status) if status.is_good() => Ok(()),
            Some(status) => Err(service_error(&self.address, *status)),
            None => Err(MonitorError::Connection(format!(
                "{}: write to {tag} returned no result",
                self.address
            ))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        {
            let session = self.session.read();
            session.disconnect();
        }
        if let Some(stop) = self.stop.take() {
            if stop.send(SessionCommand::Stop).is_err() {
                debug!(address = %self.address, "session loop already stopped");
            }
        }
        Ok(())
    }
}

/// Select the standard alarm attributes plus the condition node id, and keep
/// only events below the configured condition type.
fn event_filter(condition_type: &NodeRef) -> EventFilter {
    let mut select_clauses: Vec<SimpleAttributeOperand> = EVENT_FIELDS
        .iter()
        .map(|field| SimpleAttributeOperand {
            type_definition_id: NodeId::new(0, CONDITION_TYPE_NODE),
            browse_path: Some(vec![QualifiedName::new(0, *field)]),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
        })
        .collect();
    select_clauses.push(SimpleAttributeOperand {
        type_definition_id: NodeId::new(0, CONDITION_TYPE_NODE),
        browse_path: None,
        attribute_id: AttributeId::NodeId as u32,
        index_range: UAString::null(),
    });
    EventFilter {
        select_clauses: Some(select_clauses),
        where_clause: ContentFilter {
            elements: Some(vec![ContentFilterElement::from((
                FilterOperator::OfType,
                vec![Operand::literal(Variant::from(to_node_id(condition_type)))],
            ))]),
        },
    }
}

/// Map one notification's fields back onto the select-clause order. Servers
/// return a null variant for attributes the condition does not carry; those
/// stay `None` on the raw event.
fn parse_event_fields(fields: &[Variant]) -> RawAlarmEvent {
    let field = |index: usize| fields.get(index);
    RawAlarmEvent {
        message: field(0).and_then(as_display_text),
        time: field(1).and_then(|v| match v {
            Variant::DateTime(dt) => Some(dt.as_chrono()),
            _ => None,
        }),
        severity: field(2).and_then(|v| match v {
            Variant::UInt16(n) => Some(*n),
            _ => None,
        }),
        suppressed_or_shelved: field(3).and_then(as_bool),
        acked_state: field(4).and_then(as_display_text),
        condition_class_id: field(5).and_then(as_node_ref),
        quality: field(6).and_then(|v| match v {
            Variant::StatusCode(code) => Some(code.bits()),
            _ => None,
        }),
        retain: field(7).and_then(as_bool),
        active_state: field(8).and_then(as_display_text),
        enabled_state: field(9).and_then(as_display_text),
        node_id: field(EVENT_FIELDS.len()).and_then(as_node_ref),
    }
}

fn as_display_text(variant: &Variant) -> Option<DisplayText> {
    match variant {
        Variant::LocalizedText(text) => Some(DisplayText {
            text: text.text.to_string(),
            locale: if text.locale.is_empty() {
                None
            } else {
                Some(text.locale.to_string())
            },
        }),
        Variant::String(text) => Some(DisplayText {
            text: text.to_string(),
            locale: None,
        }),
        _ => None,
    }
}

fn as_bool(variant: &Variant) -> Option<bool> {
    match variant {
        Variant::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn as_node_ref(variant: &Variant) -> Option<NodeRef> {
    let Variant::NodeId(node_id) = variant else {
        return None;
    };
    match &node_id.identifier {
        Identifier::Numeric(n) => Some(NodeRef::numeric(node_id.namespace, *n)),
        Identifier::String(s) => Some(NodeRef::string(node_id.namespace, s.to_string())),
        _ => None,
    }
}

fn to_node_id(node: &NodeRef) -> NodeId {
    match &node.identifier {
        NodeIdentifier::Numeric(n) => NodeId::new(node.namespace_index, *n),
        NodeIdentifier::String(s) => NodeId::new(node.namespace_index, s.clone()),
    }
}

fn parse_tag(address: &str, tag: &str) -> Result<NodeId> {
    NodeId::from_str(tag).map_err(|_| {
        warn!(address, tag, "unparseable tag node id");
        MonitorError::Config(format!("'{tag}' is not a valid node id"))
    })
}

fn tag_type_of(variant: &Variant) -> Option<TagType> {
    match variant {
        Variant::Boolean(_) => Some(TagType::Bool),
        Variant::Float(_) | Variant::Double(_) => Some(TagType::Float),
        Variant::SByte(_)
        | Variant::Byte(_)
        | Variant::Int16(_)
        | Variant::UInt16(_)
        | Variant::Int32(_)
        | Variant::UInt32(_)
        | Variant::Int64(_)
        | Variant::UInt64(_) => Some(TagType::Int),
        Variant::String(_) | Variant::LocalizedText(_) => Some(TagType::Str),
        _ => None,
    }
}

fn to_variant(value: TagValue) -> Variant {
    match value {
        TagValue::Bool(b) => Variant::Boolean(b),
        TagValue::Float(f) => Variant::Double(f),
        TagValue::Int(i) => Variant::Int64(i),
        TagValue::Str(s) => Variant::String(s.into()),
    }
}

fn connect_error(address: &str, status: StatusCode) -> MonitorError {
    match status {
        StatusCode::BadUserAccessDenied => MonitorError::AccessDenied {
            address: address.to_string(),
            detail: status.to_string(),
        },
        StatusCode::BadIdentityTokenInvalid | StatusCode::BadIdentityTokenRejected => {
            MonitorError::IdentityRejected {
                address: address.to_string(),
                detail: status.to_string(),
            }
        }
        other => MonitorError::Connection(format!("{address}: {other}")),
    }
}

fn subscribe_error(address: &str, status: StatusCode) -> MonitorError {
    MonitorError::Subscription(format!("{address}: {status}"))
}

fn service_error(address: &str, status: StatusCode) -> MonitorError {
    MonitorError::Connection(format!("{address}: {status}"))
}
