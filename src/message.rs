//! Inbound AMI frames: responses and events

use crate::constants::{IGNORED_FIELDS, RESPONSE_ERROR, RESPONSE_SUCCESS};
use crate::error::{AmiError, AmiResult};
use crate::headers::{AmiEventType, AmiHeader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frame classification, from whichever of `Response` / `Event` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Reply to an action (`Response: …`).
    Response,
    /// Server-originated event (`Event: …`).
    Event,
    /// Neither header present.
    Unknown,
}

/// One parsed AMI frame.
///
/// Headers keep their wire order and spelling; lookups ignore ASCII case.
/// A name may repeat (`Variable`, `ChanVariable`); [`get`](Self::get)
/// returns the first occurrence and [`values`](Self::values) all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmiMessage {
    headers: Vec<(String, String)>,
}

impl AmiMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Build from ordered `(name, value)` pairs.
    pub fn from_headers(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    /// Append a header, keeping earlier occurrences of the same name.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .push((name.into(), value.into()));
    }

    /// Look up a header by name (case-insensitive), `None` if absent.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a header, empty string if absent.
    pub fn get(&self, name: impl AsRef<str>) -> &str {
        self.header(name)
            .unwrap_or("")
    }

    /// Every value of a possibly repeated header, in wire order.
    pub fn values(&self, name: impl AsRef<str>) -> Vec<&str> {
        let name = name.as_ref();
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether a header is present.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.header(name)
            .is_some()
    }

    /// All headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// `true` when the frame carries no headers at all.
    pub fn is_empty(&self) -> bool {
        self.headers
            .is_empty()
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.headers
            .len()
    }

    /// Response or event.
    pub fn kind(&self) -> MessageKind {
        if self.contains(AmiHeader::Event) {
            MessageKind::Event
        } else if self.contains(AmiHeader::Response) {
            MessageKind::Response
        } else {
            MessageKind::Unknown
        }
    }

    /// `true` if this frame is an event.
    pub fn is_event(&self) -> bool {
        self.kind() == MessageKind::Event
    }

    /// `true` if this frame answers an action.
    pub fn is_response(&self) -> bool {
        self.kind() == MessageKind::Response
    }

    /// `Response: Success`, compared case-insensitively.
    pub fn is_success(&self) -> bool {
        self.response()
            .is_some_and(|r| r.eq_ignore_ascii_case(RESPONSE_SUCCESS))
    }

    /// `Response: Error`, compared case-insensitively.
    pub fn is_error(&self) -> bool {
        self.response()
            .is_some_and(|r| r.eq_ignore_ascii_case(RESPONSE_ERROR))
    }

    /// `Response` header.
    pub fn response(&self) -> Option<&str> {
        self.header(AmiHeader::Response)
    }

    /// `Event` header.
    pub fn event_name(&self) -> Option<&str> {
        self.header(AmiHeader::Event)
    }

    /// Parsed event type, if the name is a well-known one.
    pub fn event_type(&self) -> Option<AmiEventType> {
        self.event_name()?
            .parse()
            .ok()
    }

    /// Lowercased event name, the pub/sub topic this frame is published on.
    pub fn topic(&self) -> Option<String> {
        self.event_name()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_ascii_lowercase())
    }

    /// `ActionID` header.
    pub fn action_id(&self) -> Option<&str> {
        self.header(AmiHeader::ActionId)
    }

    /// `Message` header.
    pub fn message(&self) -> Option<&str> {
        self.header(AmiHeader::Message)
    }

    /// Whether this event matches the given type.
    pub fn is_event_type(&self, event_type: AmiEventType) -> bool {
        self.event_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(event_type.as_str()))
    }

    /// Convert to result based on success status.
    ///
    /// Events and non-error responses pass through; `Response: Error` becomes
    /// [`AmiError::Server`] carrying the `Message` text.
    ///
    /// ```
    /// # use asterisk_ami_tokio::AmiMessage;
    /// let mut reply = AmiMessage::new();
    /// reply.push_header("Response", "Error");
    /// reply.push_header("Message", "Permission denied");
    /// assert!(reply.into_result().is_err());
    /// ```
    pub fn into_result(self) -> AmiResult<Self> {
        if self.is_error() && !self.is_event() {
            Err(AmiError::from_reply(&self))
        } else {
            Ok(self)
        }
    }

    /// Multi-value view: lowercased header name to every value, wire order.
    pub fn into_multi(self) -> MultiReply {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in self.headers {
            values
                .entry(k.to_ascii_lowercase())
                .or_default()
                .push(v);
        }
        MultiReply { values }
    }

    /// JSON object of the headers, minus the ignored-field set.
    ///
    /// Repeated headers become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (k, v) in &self.headers {
            if IGNORED_FIELDS
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(k))
            {
                continue;
            }
            match out.get_mut(k) {
                None => {
                    out.insert(k.clone(), serde_json::Value::String(v.clone()));
                }
                Some(serde_json::Value::Array(items)) => {
                    items.push(serde_json::Value::String(v.clone()));
                }
                Some(existing) => {
                    let first = existing.take();
                    *existing =
                        serde_json::Value::Array(vec![first, serde_json::Value::String(v.clone())]);
                }
            }
        }
        serde_json::Value::Object(out)
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.headers
    }
}

/// A reply with duplicated keys preserved, keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiReply {
    values: HashMap<String, Vec<String>>,
}

impl MultiReply {
    /// First value of a key, empty string if absent.
    pub fn get(&self, name: &str) -> &str {
        self.values(name)
            .first()
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Every value of a key.
    pub fn values(&self, name: &str) -> &[String] {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// `Response: Success`.
    pub fn is_success(&self) -> bool {
        self.get("response")
            .eq_ignore_ascii_case(RESPONSE_SUCCESS)
    }

    /// The underlying map.
    pub fn as_map(&self) -> &HashMap<String, Vec<String>> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_reply() -> AmiMessage {
        let mut m = AmiMessage::new();
        m.push_header("Response", "Success");
        m.push_header("ActionID", "X-1");
        m.push_header("Ping", "Pong");
        m.push_header("Timestamp", "1700000000.123456");
        m
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let m = ping_reply();
        for name in ["Response", "response", "RESPONSE", "rEsPoNsE"] {
            assert_eq!(m.get(name), "Success");
        }
        assert_eq!(m.get("actionid"), m.get("ActionID"));
        assert_eq!(m.get(AmiHeader::Ping), "Pong");
    }

    #[test]
    fn get_missing_is_empty() {
        let m = ping_reply();
        assert_eq!(m.get("Nope"), "");
        assert!(m
            .header("Nope")
            .is_none());
    }

    #[test]
    fn repeated_headers_keep_order() {
        let mut m = AmiMessage::new();
        m.push_header("Event", "VarSet");
        m.push_header("Variable", "a=1");
        m.push_header("Variable", "b=2");
        assert_eq!(m.get("Variable"), "a=1");
        assert_eq!(m.values("variable"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn success_is_case_insensitive() {
        let mut m = AmiMessage::new();
        m.push_header("Response", "success");
        assert!(m.is_success());

        let mut m = AmiMessage::new();
        m.push_header("Response", "Error");
        assert!(!m.is_success());
    }

    #[test]
    fn kind_and_topic() {
        let mut ev = AmiMessage::new();
        ev.push_header("Event", "PeerEntry");
        assert_eq!(ev.kind(), MessageKind::Event);
        assert_eq!(ev.topic(), Some("peerentry".to_string()));
        assert_eq!(ev.event_type(), Some(AmiEventType::PeerEntry));
        assert!(ev.is_event_type(AmiEventType::PeerEntry));

        assert_eq!(ping_reply().kind(), MessageKind::Response);
        assert_eq!(ping_reply().topic(), None);
        assert_eq!(AmiMessage::new().kind(), MessageKind::Unknown);
    }

    #[test]
    fn into_result_maps_error_response() {
        let mut m = AmiMessage::new();
        m.push_header("Response", "Error");
        m.push_header("Message", "No such channel");
        let err = m
            .into_result()
            .unwrap_err();
        assert!(
            matches!(err, AmiError::Server { ref response, ref message } if response == "Error" && message == "No such channel")
        );

        assert!(ping_reply()
            .into_result()
            .is_ok());
    }

    #[test]
    fn only_error_response_fails() {
        let mut goodbye = AmiMessage::new();
        goodbye.push_header("Response", "Goodbye");
        assert!(!goodbye.is_error());
        assert!(goodbye
            .into_result()
            .is_ok());

        let mut err = AmiMessage::new();
        err.push_header("response", "ERROR");
        assert!(err.is_error());
        assert!(!err.is_success());
        assert!(err
            .into_result()
            .is_err());
    }

    #[test]
    fn multi_preserves_duplicates() {
        let mut m = ping_reply();
        m.push_header("Output", "line one");
        m.push_header("Output", "line two");
        let multi = m.into_multi();
        assert_eq!(multi.values("Output"), &["line one", "line two"]);
        assert_eq!(multi.get("PING"), "Pong");
        assert!(multi.is_success());
    }

    #[test]
    fn json_drops_ignored_fields() {
        let mut m = ping_reply();
        m.push_header("Privilege", "system,all");
        m.push_header("Variable", "a=1");
        m.push_header("Variable", "b=2");
        let json = m.to_json();
        assert!(json
            .get("ActionID")
            .is_none());
        assert!(json
            .get("Privilege")
            .is_none());
        assert_eq!(json["Ping"], "Pong");
        assert_eq!(json["Variable"], serde_json::json!(["a=1", "b=2"]));
    }
}
