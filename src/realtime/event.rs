//! Typed events pushed over the realtime channel.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ChannelError;

/// Natural key of a pushed record. The backend sends these as numbers or
/// strings interchangeably, so both compare equal by their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected a string or number id, found {other}"
            ))),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Ticket as pushed by the hub. Fields this crate does not interpret are
/// kept in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    #[serde(rename = "ticketIDNo", alias = "ticketId")]
    pub ticket_id: RecordId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "assignedTo")]
    pub assigned_to_user_id: Option<RecordId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Clinic visit record as pushed by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicRecord {
    #[serde(rename = "recordID", alias = "clinicRecordID", alias = "recordId")]
    pub record_id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A user-facing notification. Never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(default, rename = "notificationID", alias = "notificationId")]
    pub notification_id: Option<RecordId>,
    #[serde(rename = "taskID", alias = "subjectTaskId", alias = "ticketIDNo")]
    pub subject_task_id: RecordId,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "isRead", alias = "read")]
    pub read: bool,
    #[serde(default, rename = "moduleCode")]
    pub module_code: Option<String>,
}

impl NotificationEvent {
    pub fn new(subject_task_id: impl Into<RecordId>, message: impl Into<String>) -> Self {
        Self {
            notification_id: None,
            subject_task_id: subject_task_id.into(),
            message: message.into(),
            read: false,
            module_code: None,
        }
    }

    /// De-duplication key: the notification id, else the task it refers to.
    pub fn key(&self) -> &RecordId {
        self.notification_id.as_ref().unwrap_or(&self.subject_task_id)
    }
}

/// Everything the hub can push.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    NewTicket(TicketRecord),
    TicketUpdated(TicketRecord),
    StatusChanged { ticket_id: RecordId, status: String },
    AssignmentChanged { ticket_id: RecordId, user_id: String },
    NewClinicRecord(ClinicRecord),
    Notification(NotificationEvent),
}

impl RealtimeEvent {
    /// Maps a hub invocation to an event. Unknown targets yield `Ok(None)`.
    pub fn from_invocation(
        target: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Self>, ChannelError> {
        let mut args = arguments.into_iter();
        let event = match target {
            "ReceiveNewTicket" => Self::NewTicket(arg(target, args.next())?),
            "ReceiveTicketUpdate" => Self::TicketUpdated(arg(target, args.next())?),
            "ReceiveStatusChange" => Self::StatusChanged {
                ticket_id: arg(target, args.next())?,
                status: arg(target, args.next())?,
            },
            "ReceiveTicketAssignment" => Self::AssignmentChanged {
                ticket_id: arg(target, args.next())?,
                user_id: text_arg(target, args.next())?,
            },
            "ReceiveNewClinicRecord" => Self::NewClinicRecord(arg(target, args.next())?),
            "ReceiveNotification" => Self::Notification(arg(target, args.next())?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The hub method this event arrives on.
    pub fn target(&self) -> &'static str {
        match self {
            Self::NewTicket(_) => "ReceiveNewTicket",
            Self::TicketUpdated(_) => "ReceiveTicketUpdate",
            Self::StatusChanged { .. } => "ReceiveStatusChange",
            Self::AssignmentChanged { .. } => "ReceiveTicketAssignment",
            Self::NewClinicRecord(_) => "ReceiveNewClinicRecord",
            Self::Notification(_) => "ReceiveNotification",
        }
    }
}

fn arg<T: DeserializeOwned>(target: &str, value: Option<Value>) -> Result<T, ChannelError> {
    let value = value.ok_or_else(|| ChannelError::Protocol(format!("{target}: missing argument")))?;
    serde_json::from_value(value).map_err(|e| ChannelError::Protocol(format!("{target}: {e}")))
}

// user ids arrive as numbers from some deployments
fn text_arg(target: &str, value: Option<Value>) -> Result<String, ChannelError> {
    arg::<RecordId>(target, value).map(|id| id.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_ticket_events() {
        let event = RealtimeEvent::from_invocation(
            "ReceiveNewTicket",
            vec![json!({ "ticketIDNo": 42, "status": "Open", "subject": "Printer jam" })],
        )
        .unwrap()
        .unwrap();

        let RealtimeEvent::NewTicket(ticket) = event else {
            panic!("expected a new ticket");
        };
        assert_eq!(ticket.ticket_id, RecordId::from(42i64));
        assert_eq!(ticket.status.as_deref(), Some("Open"));
        assert_eq!(ticket.fields.get("subject"), Some(&json!("Printer jam")));
    }

    #[test]
    fn maps_positional_arguments() {
        let args = vec![json!(7), json!("Resolved")];
        let status = RealtimeEvent::from_invocation("ReceiveStatusChange", args)
            .unwrap()
            .unwrap();
        assert_eq!(
            status,
            RealtimeEvent::StatusChanged {
                ticket_id: RecordId::from(7i64),
                status: "Resolved".to_string()
            }
        );

        let args = vec![json!("7"), json!(310)];
        let assignment = RealtimeEvent::from_invocation("ReceiveTicketAssignment", args)
            .unwrap()
            .unwrap();
        assert_eq!(
            assignment,
            RealtimeEvent::AssignmentChanged {
                ticket_id: RecordId::from(7i64),
                user_id: "310".to_string()
            }
        );
    }

    #[test]
    fn unknown_target_is_ignored() {
        assert_eq!(RealtimeEvent::from_invocation("ReceiveWeather", vec![]).unwrap(), None);
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(RealtimeEvent::from_invocation("ReceiveStatusChange", vec![json!(7)]).is_err());
    }

    #[test]
    fn notification_key_prefers_notification_id() {
        let n: NotificationEvent = serde_json::from_value(json!({
            "notificationID": 3,
            "taskID": 9,
            "message": "hi"
        }))
        .unwrap();
        assert_eq!(n.key(), &RecordId::from(3i64));
        assert!(!n.read);

        let bare = NotificationEvent::new(9i64, "hi");
        assert_eq!(bare.key(), &RecordId::from(9i64));
    }
}
