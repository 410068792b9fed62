//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async Tokio client for Asterisk's Manager Interface,
//! allowing applications to log in to an Asterisk PBX, run actions, and
//! receive events.
//!
//! # Architecture
//!
//! The library uses a split reader/writer design:
//! - [`AmiSession`] (Clone + Send): send actions from any task; writes are
//!   serialized so frames never interleave
//! - a background reader task parses inbound frames, hands replies to the
//!   action waiting on their `ActionID`, and fans frames out to [`EventSink`]s
//!   keyed by lowercased event name
//! - [`engine`]: `single`, `multi` and `list` request patterns, each taking a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! # Examples
//!
//! ## Connect and ping
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use asterisk_ami_tokio::{connect, engine, AmiError, Command};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let session = connect("localhost", 5038, "admin", "secret", Duration::from_secs(2)).await?;
//!     let ctx = CancellationToken::new();
//!
//!     let reply = engine::single(&ctx, &session, Command::ping()).await?;
//!     println!("Ping: {}", reply.get("Ping"));
//!
//!     session.logoff(&ctx).await
//! }
//! ```
//!
//! ## Typed payloads
//!
//! Any `serde::Serialize` record becomes the action's headers; serde
//! attributes control naming and omission:
//!
//! ```rust
//! use asterisk_ami_tokio::Command;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct Originate<'a> {
//!     channel: &'a str,
//!     context: &'a str,
//!     exten: &'a str,
//!     priority: u32,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     caller_id: Option<&'a str>,
//!     variable: Vec<&'a str>,
//! }
//!
//! let cmd = Command::new("Originate")
//!     .id("O-1")
//!     .payload(&Originate {
//!         channel: "PJSIP/100",
//!         context: "default",
//!         exten: "200",
//!         priority: 1,
//!         caller_id: None,
//!         variable: vec!["A=1", "B=2"],
//!     })
//!     .unwrap();
//!
//! let wire = cmd.to_wire_format().unwrap();
//! assert!(wire.starts_with("Action: Originate\r\nActionID: O-1\r\nChannel: PJSIP/100\r\n"));
//! assert!(wire.contains("Variable: A=1\r\nVariable: B=2\r\n"));
//! assert!(!wire.contains("CallerId"));
//! ```
//!
//! ## Event Subscription
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use asterisk_ami_tokio::{connect, AmiEventType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = connect("localhost", 5038, "admin", "secret", Duration::from_secs(2)).await?;
//!
//!     let hangups = session
//!         .on_event(AmiEventType::Hangup.as_str())
//!         .ok_or("session closed")?;
//!
//!     while let Some(event) = hangups.recv().await {
//!         println!("{} hung up: {}", event.get("Channel"), event.get("Cause-txt"));
//!     }
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod command;
pub mod connection;
pub mod constants;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod field;
pub mod headers;
pub mod message;
pub mod protocol;
pub mod pubsub;
pub mod retry;
pub mod session;
pub mod transport;
pub mod udp;

pub(crate) mod correlator;

pub use command::{new_action_id, Command};
pub use connection::{connect, connect_with_options, parse_address, AmiConnectOptions, Network};
pub use constants::DEFAULT_AMI_PORT;
pub use dictionary::Dictionary;
pub use error::{AmiError, AmiResult, ErrorKind, ListError};
pub use field::{Field, Value};
pub use headers::{AmiEventType, AmiHeader, ParseEventTypeError, ParseHeaderError};
pub use message::{AmiMessage, MessageKind, MultiReply};
pub use pubsub::{EventSink, PubSub};
pub use retry::RetryPolicy;
pub use session::{AmiSession, CloseReason, ErrorSink, SessionState};
pub use transport::AmiStream;
pub use udp::UdpStream;
