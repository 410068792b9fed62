//! Outbound AMI actions and their wire encoding

use crate::{
    error::{AmiError, AmiResult},
    field::{encode_fields, encode_value, Field, Value},
    headers::AmiHeader,
    protocol::render_frame,
};
use serde::Serialize;
use std::fmt;

/// Validate that a header name or value contains no line breaks.
///
/// AMI is line-delimited; an embedded newline would let a value inject
/// arbitrary headers or a second action.
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::encode_error(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Fresh random correlation token (128-bit, UUID text form).
pub fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A client-originated AMI frame.
///
/// ```
/// use asterisk_ami_tokio::Command;
///
/// let wire = Command::new("Ping")
///     .id("X-1")
///     .to_wire_format()
///     .unwrap();
/// assert_eq!(wire, "Action: Ping\r\nActionID: X-1\r\n\r\n");
/// ```
#[derive(Clone, PartialEq)]
pub struct Command {
    action: String,
    action_id: Option<String>,
    payload: Vec<Field>,
}

impl Command {
    /// Start a command for the given `Action` verb.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            action_id: None,
            payload: Vec::new(),
        }
    }

    /// Builder entry point with no action set yet.
    pub fn builder() -> Self {
        Self::new("")
    }

    /// Set the `Action` verb.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Set an explicit `ActionID`.
    pub fn id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    /// Append a field that is always emitted.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload
            .push(Field::new(name, value));
        self
    }

    /// Append a field omitted when its value is the zero value of its type.
    pub fn field_omit_empty(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload
            .push(Field::omit_empty(name, value));
        self
    }

    /// Append one header per map entry.
    pub fn fields<K, V, I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in entries {
            self.payload
                .push(Field::new(k, v));
        }
        self
    }

    /// Append a prepared field.
    pub fn push(mut self, field: Field) -> Self {
        self.payload
            .push(field);
        self
    }

    /// Append every field of a serializable record.
    ///
    /// Fails with [`AmiError::Encode`] when `record` is not a struct or map.
    pub fn payload<T: Serialize + ?Sized>(mut self, record: &T) -> AmiResult<Self> {
        match Value::from_serialize(record)? {
            Value::Record(fields) => {
                self.payload
                    .extend(fields);
                Ok(self)
            }
            Value::Optional(None) => Ok(self),
            _ => Err(AmiError::encode_error(
                "payload must serialize to a record of named fields",
            )),
        }
    }

    /// The `Action` verb.
    pub fn action_name(&self) -> &str {
        &self.action
    }

    /// The `ActionID`, if one has been set or assigned.
    pub fn action_id(&self) -> Option<&str> {
        self.action_id
            .as_deref()
    }

    /// Payload fields in insertion order.
    pub fn payload_fields(&self) -> &[Field] {
        &self.payload
    }

    /// Assign a random `ActionID` unless one is already set; returns it.
    pub fn ensure_action_id(&mut self) -> &str {
        self.action_id
            .get_or_insert_with(new_action_id)
    }

    /// Encode to `(name, value)` header pairs, `Action` and `ActionID` first.
    pub fn to_headers(&self) -> AmiResult<Vec<(String, String)>> {
        if self
            .action
            .trim()
            .is_empty()
        {
            return Err(AmiError::encode_error("missing Action"));
        }

        let mut headers = vec![(AmiHeader::Action.to_string(), self.action.clone())];
        if let Some(id) = &self.action_id {
            headers.push((AmiHeader::ActionId.to_string(), id.clone()));
        }
        encode_fields(&self.payload, &mut headers)?;

        for (name, value) in &headers {
            validate_no_newlines(name, "header name")?;
            validate_no_newlines(value, "header value")?;
            if name.is_empty() || name.contains(':') {
                return Err(AmiError::encode_error(format!(
                    "invalid header name {:?}",
                    name
                )));
            }
        }
        Ok(headers)
    }

    /// Validate all fields, then convert to wire format.
    pub fn to_wire_format(&self) -> AmiResult<String> {
        let headers = self.to_headers()?;
        Ok(render_frame(
            headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    /// `Action: Login` with optional `Events` permission mask.
    ///
    /// No `ActionID` is attached; the login reply is read directly off the
    /// socket before any correlation is running.
    pub fn login(username: &str, secret: &str, events: Option<&str>) -> Self {
        let mut cmd = Command::new("Login")
            .field(AmiHeader::Username.as_str(), username)
            .field(AmiHeader::Secret.as_str(), secret);
        if let Some(events) = events {
            cmd = cmd.field(AmiHeader::Events.as_str(), events);
        }
        cmd
    }

    /// `Action: Logoff`.
    pub fn logoff() -> Self {
        Command::new("Logoff")
    }

    /// `Action: Ping`.
    pub fn ping() -> Self {
        Command::new("Ping")
    }

    /// Whether any header of this command must stay out of logs.
    pub(crate) fn is_sensitive(&self) -> bool {
        self.payload
            .iter()
            .any(|f| is_secret_header(f.name()))
    }

    /// Wire text with secret values replaced, for trace logging.
    pub(crate) fn redacted_wire(&self) -> String {
        match self.to_headers() {
            Ok(headers) => headers
                .iter()
                .map(|(k, v)| {
                    if is_secret_header(k) {
                        format!("{}: [REDACTED]", k)
                    } else {
                        format!("{}: {}", k, v)
                    }
                })
                .collect::<Vec<_>>()
                .join(" | "),
            Err(e) => format!("<unencodable: {}>", e),
        }
    }
}

fn is_secret_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(AmiHeader::Secret.as_str()) || name.eq_ignore_ascii_case("Key")
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Command");
        s.field("action", &self.action)
            .field("action_id", &self.action_id);
        if self.is_sensitive() {
            let names: Vec<&str> = self
                .payload
                .iter()
                .map(|p| p.name())
                .collect();
            s.field("payload", &names)
                .field("values", &"[REDACTED]");
        } else {
            s.field("payload", &self.payload);
        }
        s.finish()
    }
}

/// Encode a single named value as standalone header lines.
///
/// Exposed for callers that assemble frames from their own field sources.
pub fn encode_field(name: &str, value: &Value) -> AmiResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    encode_value(name, value, &mut out)?;
    Ok(out)
}
