//! Protocol constants and configuration values

/// Default Asterisk Manager Interface port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Field terminator on the wire
pub const LINE_TERMINATOR: &str = "\r\n";

/// Frame terminator: the last header line plus one empty line
pub const FRAME_TERMINATOR: &str = "\r\n\r\n";

/// Prefix of the greeting line Asterisk writes on connect
pub const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Topic that receives every inbound frame regardless of its `Event` name
pub const ANY_MESSAGE_TOPIC: &str = "any-message";

/// Socket buffer size for the line reader (64KB), also large enough for one UDP datagram
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Maximum single frame size (1MB). No AMI frame should come close;
/// exceeding it means the peer is not speaking AMI.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Handshake (banner + login) timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Capacity of the line queue between the ingest task and the frame reader
pub const DEFAULT_INGEST_QUEUE_SIZE: usize = 1024;

/// Capacity of the session error channel
pub const DEFAULT_ERROR_QUEUE_SIZE: usize = 16;

/// Default attempt count when retries are enabled
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// `Response` value of a successful action
pub const RESPONSE_SUCCESS: &str = "Success";

/// `Response` value of a failed action
pub const RESPONSE_ERROR: &str = "Error";

/// `Response` value of a successful `Logoff`
pub const RESPONSE_GOODBYE: &str = "Goodbye";

/// `Status` value reported while Asterisk is still loading modules
pub const STATUS_FULLY_BOOTED: &str = "Fully Booted";

/// Header noise dropped from JSON projections of a reply
pub const IGNORED_FIELDS: &[&str] = &["ActionID", "Privilege", "UniqueId", "Uniqueid"];
