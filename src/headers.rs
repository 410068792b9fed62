//! Typed header and event names for AMI frames.

/// Error returned when parsing an unrecognized header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHeaderError(pub String);

impl std::fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI header: {}", self.0)
    }
}

impl std::error::Error for ParseHeaderError {}

define_header_enum! {
    error_type: ParseHeaderError,
    /// Header names the client itself reads or writes.
    ///
    /// Use with [`AmiMessage::get()`](crate::AmiMessage::get) for typed
    /// lookups; any other header is still reachable by its string name.
    pub enum AmiHeader {
        Action => "Action",
        ActionId => "ActionID",
        Response => "Response",
        Event => "Event",
        Message => "Message",
        Privilege => "Privilege",
        Username => "Username",
        Secret => "Secret",
        Events => "Events",
        Status => "Status",
        EventList => "EventList",
        UniqueId => "Uniqueid",
        Ping => "Ping",
        Timestamp => "Timestamp",
        Channel => "Channel",
        Variable => "Variable",
    }
}

/// Error returned when parsing an unknown event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventTypeError(pub String);

impl std::fmt::Display for ParseEventTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI event: {}", self.0)
    }
}

impl std::error::Error for ParseEventTypeError {}

define_header_enum! {
    error_type: ParseEventTypeError,
    /// Well-known `Event:` names.
    ///
    /// Subscriptions take any `AsRef<str>`, so events missing here are
    /// still reachable by name.
    pub enum AmiEventType {
        FullyBooted => "FullyBooted",
        Shutdown => "Shutdown",
        Newchannel => "Newchannel",
        Newstate => "Newstate",
        NewCallerid => "NewCallerid",
        Hangup => "Hangup",
        HangupRequest => "HangupRequest",
        DialBegin => "DialBegin",
        DialEnd => "DialEnd",
        OriginateResponse => "OriginateResponse",
        BridgeCreate => "BridgeCreate",
        BridgeEnter => "BridgeEnter",
        BridgeLeave => "BridgeLeave",
        BridgeDestroy => "BridgeDestroy",
        BridgeListItem => "BridgeListItem",
        BridgeListComplete => "BridgeListComplete",
        DtmfBegin => "DTMFBegin",
        DtmfEnd => "DTMFEnd",
        QueueMemberStatus => "QueueMemberStatus",
        QueueCallerJoin => "QueueCallerJoin",
        QueueCallerLeave => "QueueCallerLeave",
        QueueParams => "QueueParams",
        QueueMember => "QueueMember",
        QueueStatusComplete => "QueueStatusComplete",
        Registry => "Registry",
        PeerStatus => "PeerStatus",
        ContactStatus => "ContactStatus",
        PeerEntry => "PeerEntry",
        PeerlistComplete => "PeerlistComplete",
        EndpointList => "EndpointList",
        EndpointListComplete => "EndpointListComplete",
        CoreShowChannel => "CoreShowChannel",
        CoreShowChannelsComplete => "CoreShowChannelsComplete",
        Cdr => "Cdr",
        Cel => "CEL",
        VarSet => "VarSet",
        UserEvent => "UserEvent",
    }
}
