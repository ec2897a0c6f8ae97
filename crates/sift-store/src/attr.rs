// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attribute rendering, the single source of truth for field extraction.
//!
//! The filter engine, the sort view and any consumer rendering calls all
//! go through [`attribute`]; adding a filterable field means extending
//! [`Attr`] and the match below, nothing else.

use chrono::{DateTime, Local};
use std::time::SystemTime;

use sift_core::{Attr, SipMessage};
use sift_parse::SipGrammar;

use crate::call::Call;

/// Renders one attribute of a call to a string.
///
/// First-message fields (SRC, DST, METHOD, CSEQ, DATE, TIME and the
/// From/To family) follow the message that opened the dialog. Returns
/// None when the attribute is unset for this call.
pub(crate) fn attribute(grammar: &SipGrammar, call: &Call, attr: Attr) -> Option<String> {
    let first = call.first_msg();
    match attr {
        Attr::CallId => Some(call.call_id().to_string()),
        Attr::XCallId => call.x_call_id().map(|id| id.to_string()),
        Attr::From => fields(grammar, first?).from_user.as_ref().map(|u| u.to_string()),
        Attr::To => fields(grammar, first?).to_user.as_ref().map(|u| u.to_string()),
        Attr::Src => Some(first?.src().to_string()),
        Attr::Dst => Some(first?.dst().to_string()),
        Attr::Method => Some(first?.method_display().to_string()),
        Attr::CSeq => first?.cseq().map(|n| n.to_string()),
        Attr::Date => Some(date_str(first?.ts())),
        Attr::Time => Some(time_str(first?.ts())),
        Attr::SipFrom => Some(fields(grammar, first?).sip_from.to_string()),
        Attr::SipTo => Some(fields(grammar, first?).sip_to.to_string()),
        Attr::MsgCount => Some(call.msgs().len().to_string()),
        Attr::RtpCount => Some(call.rtp_packet_total().to_string()),
        Attr::State => call.state().map(|state| state.as_str().to_string()),
        Attr::ConvDuration => {
            let start = call.msgs().get(call.conv_start?)?.ts();
            let end = call.msgs().get(call.conv_end?)?.ts();
            Some(duration_str(start, end))
        }
        Attr::TotalDuration => {
            let first = call.first_msg()?;
            let last = call.last_msg()?;
            Some(duration_str(first.ts(), last.ts()))
        }
        Attr::Reason => call.reason_text().map(|text| text.to_string()),
        Attr::Warning => call.warning().map(|code| code.to_string()),
        Attr::Transport => Some(first?.transport().as_str().to_string()),
    }
}

/// ngrep-style one-line message summary:
/// `date time src -> dst method cseq call-id`.
pub(crate) fn msg_header(msg: &SipMessage) -> String {
    format!(
        "{} {} {} -> {} {} {} {}",
        date_str(msg.ts()),
        time_str(msg.ts()),
        msg.src(),
        msg.dst(),
        msg.method_display(),
        msg.cseq().map_or_else(|| "-".into(), |n| n.to_string()),
        msg.call_id(),
    )
}

/// One-line call summary, the field the CALL_LIST_LINE filter matches.
pub(crate) fn call_list_line(grammar: &SipGrammar, call: &Call) -> String {
    let attr = |attr| attribute(grammar, call, attr).unwrap_or_default();
    format!(
        "{} {} {} {} {} {} {} {} {} {}",
        call.index(),
        attr(Attr::Date),
        attr(Attr::Time),
        attr(Attr::Src),
        attr(Attr::Dst),
        attr(Attr::MsgCount),
        attr(Attr::Method),
        attr(Attr::State),
        attr(Attr::SipFrom),
        attr(Attr::SipTo),
    )
}

fn fields<'m>(grammar: &SipGrammar, msg: &'m SipMessage) -> &'m sift_core::HeaderFields {
    msg.header_fields_or_parse(|payload| grammar.header_fields(payload))
}

fn date_str(ts: SystemTime) -> String {
    let local: DateTime<Local> = ts.into();
    local.format("%Y/%m/%d").to_string()
}

fn time_str(ts: SystemTime) -> String {
    let local: DateTime<Local> = ts.into();
    local.format("%H:%M:%S%.6f").to_string()
}

fn duration_str(start: SystemTime, end: SystemTime) -> String {
    let secs = end
        .duration_since(start)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
