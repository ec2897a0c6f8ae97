use smol_str::SmolStr;

/// SIP request methods recognized by the storage engine.
///
/// The discriminants carry the fixed numbering used throughout the call
/// storage, where a single integer space covers both request methods
/// (1..=14) and response status codes (100..=699).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Method {
    Register = 1,
    Invite,
    Subscribe,
    Notify,
    Options,
    Publish,
    Message,
    Cancel,
    Bye,
    Ack,
    Prack,
    Info,
    Refer,
    Update,
}

/// All methods in numbering order.
pub const METHODS: [Method; 14] = [
    Method::Register,
    Method::Invite,
    Method::Subscribe,
    Method::Notify,
    Method::Options,
    Method::Publish,
    Method::Message,
    Method::Cancel,
    Method::Bye,
    Method::Ack,
    Method::Prack,
    Method::Info,
    Method::Refer,
    Method::Update,
];

impl Method {
    /// Returns the canonical uppercase string representation for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Options => "OPTIONS",
            Method::Publish => "PUBLISH",
            Method::Message => "MESSAGE",
            Method::Cancel => "CANCEL",
            Method::Bye => "BYE",
            Method::Ack => "ACK",
            Method::Prack => "PRACK",
            Method::Info => "INFO",
            Method::Refer => "REFER",
            Method::Update => "UPDATE",
        }
    }

    /// Parses a method token, returning None for extension methods.
    ///
    /// The storage engine only groups dialogs started by known methods, so
    /// unlike a full stack there is no `Unknown` variant here.
    pub fn from_token(token: &str) -> Option<Self> {
        METHODS
            .iter()
            .find(|m| token.eq_ignore_ascii_case(m.as_str()))
            .copied()
    }

    /// Returns the fixed numeric code for this method.
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request method or response status code of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReqResp {
    Request(Method),
    Response(u16),
}

impl ReqResp {
    /// Numeric code: the method ordinal for requests, the status code for
    /// responses. Requests always sort below 100.
    pub fn code(&self) -> u16 {
        match self {
            ReqResp::Request(m) => m.code(),
            ReqResp::Response(code) => *code,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, ReqResp::Request(_))
    }

    pub fn method(&self) -> Option<Method> {
        match self {
            ReqResp::Request(m) => Some(*m),
            ReqResp::Response(_) => None,
        }
    }

    /// Parses a start-line token: a known method name becomes a request, a
    /// numeric value in the status range becomes a response.
    pub fn from_start_token(token: &str) -> Option<Self> {
        if let Some(method) = Method::from_token(token) {
            return Some(ReqResp::Request(method));
        }
        match token.parse::<u16>() {
            Ok(code) if (100..700).contains(&code) => Some(ReqResp::Response(code)),
            _ => None,
        }
    }

    /// Renders the request/response for display, using the well-known
    /// response text table for codes that have one.
    pub fn display_str(&self) -> SmolStr {
        match self {
            ReqResp::Request(m) => SmolStr::new_static(m.as_str()),
            ReqResp::Response(code) => match default_status_text(*code) {
                Some(text) => SmolStr::new_static(text),
                None => SmolStr::new(code.to_string()),
            },
        }
    }
}

/// Well-known response texts, rendered as `code reason`.
///
/// Responses with a reason phrase differing from this table keep their
/// literal phrase on the message instead.
pub fn default_status_text(code: u16) -> Option<&'static str> {
    let text = match code {
        100 => "100 Trying",
        180 => "180 Ringing",
        181 => "181 Call is Being Forwarded",
        182 => "182 Queued",
        183 => "183 Session Progress",
        199 => "199 Early Dialog Terminated",
        200 => "200 OK",
        202 => "202 Accepted",
        204 => "204 No Notification",
        300 => "300 Multiple Choices",
        301 => "301 Moved Permanently",
        302 => "302 Moved Temporarily",
        305 => "305 Use Proxy",
        380 => "380 Alternative Service",
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        402 => "402 Payment Required",
        403 => "403 Forbidden",
        404 => "404 Not Found",
        405 => "405 Method Not Allowed",
        406 => "406 Not Acceptable",
        407 => "407 Proxy Authentication Required",
        408 => "408 Request Timeout",
        409 => "409 Conflict",
        410 => "410 Gone",
        411 => "411 Length Required",
        412 => "412 Conditional Request Failed",
        413 => "413 Request Entity Too Large",
        414 => "414 Request-URI Too Long",
        415 => "415 Unsupported Media Type",
        416 => "416 Unsupported URI Scheme",
        417 => "417 Unknown Resource-Priority",
        420 => "420 Bad Extension",
        421 => "421 Extension Required",
        422 => "422 Session Interval Too Small",
        423 => "423 Interval Too Brief",
        424 => "424 Bad Location Information",
        428 => "428 Use Identity Header",
        429 => "429 Provide Referrer Identity",
        430 => "430 Flow Failed",
        433 => "433 Anonymity Disallowed",
        436 => "436 Bad Identity-Info",
        437 => "437 Unsupported Certificate",
        438 => "438 Invalid Identity Header",
        439 => "439 First Hop Lacks Outbound Support",
        470 => "470 Consent Needed",
        480 => "480 Temporarily Unavailable",
        481 => "481 Call/Transaction Does Not Exist",
        482 => "482 Loop Detected.",
        483 => "483 Too Many Hops",
        484 => "484 Address Incomplete",
        485 => "485 Ambiguous",
        486 => "486 Busy Here",
        487 => "487 Request Terminated",
        488 => "488 Not Acceptable Here",
        489 => "489 Bad Event",
        491 => "491 Request Pending",
        493 => "493 Undecipherable",
        494 => "494 Security Agreement Required",
        500 => "500 Server Internal Error",
        501 => "501 Not Implemented",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        504 => "504 Server Time-out",
        505 => "505 Version Not Supported",
        513 => "513 Message Too Large",
        580 => "580 Precondition Failure",
        600 => "600 Busy Everywhere",
        603 => "603 Decline",
        604 => "604 Does Not Exist Anywhere",
        606 => "606 Not Acceptable",
        _ => return None,
    };
    Some(text)
}
