// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Closed set of renderable call attributes.
///
/// The attribute accessor in the storage crate is the single source of
/// truth for turning one of these ids into a string; the filter engine and
/// the sort view both go through it, so adding a filterable field means
/// extending this enum and the accessor, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    /// Call-ID header value
    CallId,
    /// X-Call-ID header value
    XCallId,
    /// User part of the From URI
    From,
    /// User part of the To URI
    To,
    /// Source endpoint of the first message
    Src,
    /// Destination endpoint of the first message
    Dst,
    /// Request method or response code of the first message
    Method,
    /// CSeq number of the first message
    CSeq,
    /// Capture date of the first message
    Date,
    /// Capture time of the first message
    Time,
    /// Full From URI
    SipFrom,
    /// Full To URI
    SipTo,
    /// Number of messages in the call
    MsgCount,
    /// Number of RTP packets seen across the call streams
    RtpCount,
    /// Dialog state
    State,
    /// Conversation duration (answer to hangup)
    ConvDuration,
    /// Total duration (first to last message)
    TotalDuration,
    /// Reason header text
    Reason,
    /// Warning header code
    Warning,
    /// Capture transport of the first message
    Transport,
}

/// All attributes, in rendering order.
pub const ATTRS: [Attr; 20] = [
    Attr::CallId,
    Attr::XCallId,
    Attr::From,
    Attr::To,
    Attr::Src,
    Attr::Dst,
    Attr::Method,
    Attr::CSeq,
    Attr::Date,
    Attr::Time,
    Attr::SipFrom,
    Attr::SipTo,
    Attr::MsgCount,
    Attr::RtpCount,
    Attr::State,
    Attr::ConvDuration,
    Attr::TotalDuration,
    Attr::Reason,
    Attr::Warning,
    Attr::Transport,
];

impl Attr {
    /// Stable identifier, usable in configuration and sort settings.
    pub fn name(&self) -> &'static str {
        match self {
            Attr::CallId => "callid",
            Attr::XCallId => "xcallid",
            Attr::From => "from",
            Attr::To => "to",
            Attr::Src => "src",
            Attr::Dst => "dst",
            Attr::Method => "method",
            Attr::CSeq => "cseq",
            Attr::Date => "date",
            Attr::Time => "time",
            Attr::SipFrom => "sipfrom",
            Attr::SipTo => "sipto",
            Attr::MsgCount => "msgcnt",
            Attr::RtpCount => "rtpcnt",
            Attr::State => "state",
            Attr::ConvDuration => "convdur",
            Attr::TotalDuration => "totaldur",
            Attr::Reason => "reason",
            Attr::Warning => "warning",
            Attr::Transport => "transport",
        }
    }

    /// Looks an attribute up by its stable name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        ATTRS
            .iter()
            .find(|attr| name.eq_ignore_ascii_case(attr.name()))
            .copied()
    }
}
