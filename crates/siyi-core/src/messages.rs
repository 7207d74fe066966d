//! Wire message model.
//!
//! Three message kinds travel over a connection, one JSON object per text
//! frame, discriminated by the `type` field:
//!
//! - [`Request`]: a call that expects exactly one [`Response`] with the same id
//! - [`Response`]: the answer to a request, `status` is `ok` or `error`
//! - [`Event`]: fire-and-forget notification, never answered
//!
//! Construction validates invariants (non-empty command/name, the
//! ok⇒no-error / error⇒no-data rule), and decoding runs the same validation,
//! so an invalid message can neither be built nor received.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProtocolError, Result};
use crate::ids::MessageId;

/// Parameter / payload mapping carried by requests and events.
pub type Params = Map<String, Value>;

/// Convert a JSON object into [`Params`].
pub fn to_params(value: Value) -> Result<Params> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProtocolError::InvalidMessage(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// A call expecting exactly one [`Response`] sharing its id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest")]
pub struct Request {
    id: MessageId,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Params>,
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    id: MessageId,
    command: String,
    #[serde(default)]
    params: Option<Params>,
}

impl TryFrom<RawRequest> for Request {
    type Error = ProtocolError;

    fn try_from(raw: RawRequest) -> Result<Self> {
        Ok(Self::new(raw.command)?.with_id(raw.id).with_params_opt(raw.params))
    }
}

impl Request {
    /// Create a request with a fresh id.
    pub fn new(command: impl Into<String>) -> Result<Self> {
        let command = command.into();
        if command.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "request command must not be empty".into(),
            ));
        }
        Ok(Self {
            id: MessageId::new(),
            command,
            params: None,
        })
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach parameters.
    #[must_use]
    pub fn with_params(self, params: Params) -> Self {
        self.with_params_opt(Some(params))
    }

    /// Attach optional parameters.
    #[must_use]
    pub fn with_params_opt(mut self, params: Option<Params>) -> Self {
        self.params = params;
        self
    }

    /// Correlation id.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Parameters, if any.
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Look up a single parameter.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome carried by a [`Response`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The request succeeded; `data` may be present, `error` is absent.
    Ok,
    /// The request failed; `error` may be present, `data` is absent.
    Error,
}

impl ResponseStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Answer to a [`Request`]; its id equals the request's id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct Response {
    id: MessageId,
    status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    id: MessageId,
    status: ResponseStatus,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<RawResponse> for Response {
    type Error = ProtocolError;

    fn try_from(raw: RawResponse) -> Result<Self> {
        Self::new(raw.id, raw.status, raw.data, raw.error)
    }
}

impl Response {
    /// Build a response, enforcing the status invariant.
    ///
    /// `data: Some(Value::Null)` is treated as absent.
    pub fn new(
        id: impl Into<MessageId>,
        status: ResponseStatus,
        data: Option<Value>,
        error: Option<String>,
    ) -> Result<Self> {
        let data = data.filter(|d| !d.is_null());
        match status {
            ResponseStatus::Ok if error.is_some() => Err(ProtocolError::InvalidMessage(
                "error must be absent when status is 'ok'".into(),
            )),
            ResponseStatus::Error if data.is_some() => Err(ProtocolError::InvalidMessage(
                "data must be absent when status is 'error'".into(),
            )),
            _ => Ok(Self {
                id: id.into(),
                status,
                data,
                error,
            }),
        }
    }

    /// Build an `ok` response carrying `data` (`Value::Null` means no data).
    pub fn success(id: impl Into<MessageId>, data: Value) -> Self {
        Self {
            id: id.into(),
            status: ResponseStatus::Ok,
            data: Some(data).filter(|d| !d.is_null()),
            error: None,
        }
    }

    /// Build an `error` response carrying a message.
    pub fn fail(id: impl Into<MessageId>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ResponseStatus::Error,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Correlation id.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Outcome status.
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Whether the status is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Success payload.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consume and return the success payload.
    pub fn into_data(self) -> Option<Value> {
        self.data
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// Fire-and-forget notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    id: MessageId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Params>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: MessageId,
    name: String,
    #[serde(default)]
    data: Option<Params>,
}

impl TryFrom<RawEvent> for Event {
    type Error = ProtocolError;

    fn try_from(raw: RawEvent) -> Result<Self> {
        Ok(Self::new(raw.name)?.with_id(raw.id).with_data_opt(raw.data))
    }
}

impl Event {
    /// Create an event with a fresh id.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "event name must not be empty".into(),
            ));
        }
        Ok(Self {
            id: MessageId::new(),
            name,
            data: None,
        })
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(self, data: Params) -> Self {
        self.with_data_opt(Some(data))
    }

    /// Attach an optional payload.
    #[must_use]
    pub fn with_data_opt(mut self, data: Option<Params>) -> Self {
        self.data = data;
        self
    }

    /// Event id.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload, if any.
    pub fn data(&self) -> Option<&Params> {
        self.data.as_ref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminator of a [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `"request"`
    Request,
    /// `"response"`
    Response,
    /// `"event"`
    Event,
}

impl MessageKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
        }
    }
}

/// Any message that can travel over a connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// A request.
    Request(Request),
    /// A response.
    Response(Response),
    /// An event.
    Event(Event),
}

impl Message {
    /// Decode one text frame.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode {
            reason: e.to_string(),
            payload: raw.to_owned(),
        })
    }

    /// Encode to one text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    /// Message id.
    pub fn id(&self) -> &MessageId {
        match self {
            Self::Request(r) => r.id(),
            Self::Response(r) => r.id(),
            Self::Event(e) => e.id(),
        }
    }

    /// Discriminator.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::Request,
            Self::Response(_) => MessageKind::Response,
            Self::Event(_) => MessageKind::Event,
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<Event> for Message {
    fn from(e: Event) -> Self {
        Self::Event(e)
    }
}

/// Decode one text frame into a [`Message`].
pub fn decode(raw: &str) -> Result<Message> {
    Message::decode(raw)
}

/// Encode a [`Message`] into one text frame.
pub fn encode(message: &Message) -> Result<String> {
    message.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        to_params(value).unwrap()
    }

    // ── Construction ────────────────────────────────────────────────

    #[test]
    fn request_gets_fresh_id() {
        let a = Request::new("echo").unwrap();
        let b = Request::new("echo").unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.params().is_none());
    }

    #[test]
    fn empty_command_rejected() {
        assert_matches!(Request::new(""), Err(ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn empty_event_name_rejected() {
        assert_matches!(Event::new(""), Err(ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn response_ok_with_error_rejected() {
        let err = Response::new("r1", ResponseStatus::Ok, None, Some("boom".into())).unwrap_err();
        assert!(err.to_string().contains("error must be absent"));
    }

    #[test]
    fn response_error_with_data_rejected() {
        let err =
            Response::new("r1", ResponseStatus::Error, Some(json!({"x": 1})), None).unwrap_err();
        assert!(err.to_string().contains("data must be absent"));
    }

    #[test]
    fn response_null_data_counts_as_absent() {
        let resp = Response::new("r1", ResponseStatus::Error, Some(Value::Null), Some("x".into()))
            .unwrap();
        assert!(resp.data().is_none());
        assert_eq!(resp.error(), Some("x"));
    }

    #[test]
    fn success_and_fail_helpers() {
        let ok = Response::success("r1", json!({"players": ["Steve", "Alex"]}));
        assert!(ok.is_ok());
        assert_eq!(ok.data().unwrap()["players"][1], "Alex");
        assert!(ok.error().is_none());

        let fail = Response::fail("r1", "Unknown command");
        assert_eq!(fail.status(), ResponseStatus::Error);
        assert_eq!(fail.error(), Some("Unknown command"));
        assert!(fail.data().is_none());
    }

    #[test]
    fn success_with_null_has_no_data() {
        let ok = Response::success("r1", Value::Null);
        assert!(ok.data().is_none());
        let json = Message::from(ok).encode().unwrap();
        assert!(!json.contains("data"));
    }

    // ── Wire format ─────────────────────────────────────────────────

    #[test]
    fn request_wire_shape() {
        let req = Request::new("get_player_list")
            .unwrap()
            .with_id("abc")
            .with_params(params(json!({"world": "overworld"})));
        let v: Value = serde_json::from_str(&Message::from(req).encode().unwrap()).unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["id"], "abc");
        assert_eq!(v["command"], "get_player_list");
        assert_eq!(v["params"]["world"], "overworld");
    }

    #[test]
    fn response_wire_shape() {
        let v: Value = serde_json::from_str(
            &Message::from(Response::fail("r9", "nope")).encode().unwrap(),
        )
        .unwrap();
        assert_eq!(v["type"], "response");
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "nope");
        assert!(v.get("data").is_none());
    }

    #[test]
    fn event_wire_shape() {
        let event = Event::new("player_joined")
            .unwrap()
            .with_data(params(json!({"player_name": "Herobrine"})));
        let v: Value = serde_json::from_str(&Message::from(event).encode().unwrap()).unwrap();
        assert_eq!(v["type"], "event");
        assert_eq!(v["name"], "player_joined");
        assert_eq!(v["data"]["player_name"], "Herobrine");
    }

    // ── Decoding ────────────────────────────────────────────────────

    #[test]
    fn decode_request_without_id_generates_one() {
        let msg = decode(r#"{"type": "request", "command": "test"}"#).unwrap();
        assert_matches!(msg, Message::Request(ref r) if r.command() == "test");
        assert!(!msg.id().as_str().is_empty());
    }

    #[test]
    fn decode_accepts_explicit_nulls() {
        let msg = decode(
            r#"{"id":"r1","type":"response","status":"ok","data":{"a":1},"error":null}"#,
        )
        .unwrap();
        let Message::Response(resp) = msg else {
            panic!("expected response");
        };
        assert_eq!(resp.data().unwrap()["a"], 1);
    }

    #[test]
    fn decode_missing_type_fails() {
        let err = decode(r#"{"id":"1","command":"x"}"#).unwrap_err();
        assert_matches!(err, ProtocolError::Decode { ref payload, .. } if payload.contains("command"));
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert_matches!(
            decode(r#"{"type":"notification","name":"x"}"#),
            Err(ProtocolError::Decode { .. })
        );
    }

    #[test]
    fn decode_malformed_json_fails() {
        let err = decode("not json at all").unwrap_err();
        assert_matches!(err, ProtocolError::Decode { ref payload, .. } if payload == "not json at all");
    }

    #[test]
    fn decode_missing_required_field_fails() {
        assert_matches!(
            decode(r#"{"type":"request","id":"1"}"#),
            Err(ProtocolError::Decode { .. })
        );
        assert_matches!(
            decode(r#"{"type":"response","status":"ok"}"#),
            Err(ProtocolError::Decode { .. })
        );
        assert_matches!(decode(r#"{"type":"event"}"#), Err(ProtocolError::Decode { .. }));
    }

    #[test]
    fn decode_mistyped_field_fails() {
        assert_matches!(
            decode(r#"{"type":"request","command":"x","params":[1,2]}"#),
            Err(ProtocolError::Decode { .. })
        );
        assert_matches!(
            decode(r#"{"type":"response","id":"1","status":"maybe"}"#),
            Err(ProtocolError::Decode { .. })
        );
    }

    #[test]
    fn decode_rejects_invariant_violations() {
        let err = decode(r#"{"type":"response","id":"1","status":"ok","error":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("error must be absent"));
        assert_matches!(
            decode(r#"{"type":"response","id":"1","status":"error","data":{"x":1}}"#),
            Err(ProtocolError::Decode { .. })
        );
        assert_matches!(
            decode(r#"{"type":"request","command":""}"#),
            Err(ProtocolError::Decode { .. })
        );
    }

    #[test]
    fn decode_non_object_fails() {
        assert_matches!(decode("[1,2,3]"), Err(ProtocolError::Decode { .. }));
        assert_matches!(decode(""), Err(ProtocolError::Decode { .. }));
    }

    #[test]
    fn kind_matches_variant() {
        let msg = Message::from(Event::new("e").unwrap());
        assert_eq!(msg.kind(), MessageKind::Event);
        assert_eq!(msg.kind().as_str(), "event");
        assert_eq!(ResponseStatus::Error.as_str(), "error");
    }

    #[test]
    fn to_params_rejects_non_objects() {
        assert!(to_params(json!([1])).is_err());
        assert!(to_params(json!("x")).is_err());
    }

    // ── Round-trip law ──────────────────────────────────────────────

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::from),
        ]
    }

    fn params_strategy() -> impl Strategy<Value = Option<Params>> {
        proptest::option::of(
            proptest::collection::btree_map("[a-z_]{1,8}", leaf(), 0..5)
                .prop_map(|m| m.into_iter().collect::<Params>()),
        )
    }

    fn id_strategy() -> impl Strategy<Value = MessageId> {
        prop_oneof![
            Just(()).prop_map(|()| MessageId::new()),
            "[a-zA-Z0-9-]{1,20}".prop_map(MessageId::from),
        ]
    }

    fn message_strategy() -> impl Strategy<Value = Message> {
        prop_oneof![
            (id_strategy(), "[a-z_.]{1,16}", params_strategy()).prop_map(|(id, cmd, p)| {
                Message::from(Request::new(cmd).unwrap().with_id(id).with_params_opt(p))
            }),
            (id_strategy(), "[a-z_.]{1,16}", params_strategy()).prop_map(|(id, name, d)| {
                Message::from(Event::new(name).unwrap().with_id(id).with_data_opt(d))
            }),
            (id_strategy(), params_strategy()).prop_map(|(id, d)| {
                Message::from(Response::success(id, d.map_or(Value::Null, Value::Object)))
            }),
            (id_strategy(), proptest::option::of("[a-z ]{0,20}")).prop_map(|(id, e)| {
                Message::from(Response::new(id, ResponseStatus::Error, None, e).unwrap())
            }),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(msg in message_strategy()) {
            let wire = msg.encode().unwrap();
            let back = decode(&wire).unwrap();
            prop_assert_eq!(back.kind(), msg.kind());
            prop_assert_eq!(back, msg);
        }
    }
}
