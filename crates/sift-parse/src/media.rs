// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SDP media scan for message bodies.
//!
//! This is not a full SDP parser: the storage engine only needs enough of
//! the session description to predict where RTP will flow. It collects
//! `m=` lines with their effective connection address, the declared
//! formats, and an optional explicit RTCP port.

use smol_str::SmolStr;
use std::net::IpAddr;

/// One `m=` line of an SDP body, with its effective connection data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Media type token (`audio`, `video`, ...).
    pub media_type: SmolStr,
    /// Connection address: the session-level `c=` line, overridden by a
    /// media-level one.
    pub address: Option<IpAddr>,
    /// Media port from the `m=` line.
    pub port: u16,
    /// First format code of the `m=` line, the sender's preference.
    pub preferred_format: u32,
    /// Formats declared via `a=rtpmap:`.
    pub formats: Vec<(u32, SmolStr)>,
    /// Explicit RTCP port from `a=rtcp:`, when present.
    pub rtcp_port: Option<u16>,
}

/// Scans a payload for SDP media descriptions.
///
/// Only `m=` lines using an RTP profile are reported. Lines are processed
/// in order, so a `c=` line between two `m=` lines applies to the first.
pub fn media_descriptors(payload: &str) -> Vec<MediaDescriptor> {
    let mut descriptors: Vec<MediaDescriptor> = Vec::new();
    let mut session_addr: Option<IpAddr> = None;

    for line in payload.lines() {
        if let Some(rest) = line.strip_prefix("m=") {
            if let Some((media_type, port, preferred_format)) = parse_media_line(rest) {
                descriptors.push(MediaDescriptor {
                    media_type,
                    address: session_addr,
                    port,
                    preferred_format,
                    formats: Vec::new(),
                    rtcp_port: None,
                });
            }
        } else if let Some(rest) = line.strip_prefix("c=") {
            if let Some(addr) = parse_connection_line(rest) {
                match descriptors.last_mut() {
                    Some(media) => media.address = Some(addr),
                    None => session_addr = Some(addr),
                }
            }
        } else if let Some(rest) = line.strip_prefix("a=rtpmap:") {
            if let (Some(media), Some((code, name))) =
                (descriptors.last_mut(), parse_rtpmap(rest))
            {
                media.formats.push((code, name));
            }
        } else if let Some(rest) = line.strip_prefix("a=rtcp:") {
            if let Some(media) = descriptors.last_mut() {
                media.rtcp_port = rest
                    .split_whitespace()
                    .next()
                    .and_then(|port| port.parse().ok());
            }
        }
    }

    descriptors
}

/// `<type> <port> RTP/<profile> <fmt> [...]`
fn parse_media_line(rest: &str) -> Option<(SmolStr, u16, u32)> {
    let mut tokens = rest.split_whitespace();
    let media_type = tokens.next()?;
    let port = tokens.next()?.parse().ok()?;
    if !tokens.next()?.starts_with("RTP/") {
        return None;
    }
    let preferred_format = tokens.next()?.parse().ok()?;
    Some((SmolStr::new(media_type), port, preferred_format))
}

/// `IN IP4 <address>` (or IP6)
fn parse_connection_line(rest: &str) -> Option<IpAddr> {
    let mut tokens = rest.split_whitespace();
    if tokens.next()? != "IN" {
        return None;
    }
    let _addrtype = tokens.next()?;
    tokens.next()?.parse().ok()
}

/// `<code> <name>/<clock>[/...]`
fn parse_rtpmap(rest: &str) -> Option<(u32, SmolStr)> {
    let mut tokens = rest.split_whitespace();
    let code = tokens.next()?.parse().ok()?;
    let name = tokens.next()?;
    Some((code, SmolStr::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP_BODY: &str = "v=0\r\n\
        o=alice 2890844526 2890844526 IN IP4 198.51.100.1\r\n\
        s=-\r\n\
        c=IN IP4 198.51.100.1\r\n\
        t=0 0\r\n\
        m=audio 49170 RTP/AVP 0 8 96\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:8 PCMA/8000\r\n\
        a=rtpmap:96 opus/48000/2\r\n\
        a=rtcp:49171\r\n";

    #[test]
    fn single_audio_media() {
        let media = media_descriptors(SDP_BODY);
        assert_eq!(media.len(), 1);
        let audio = &media[0];
        assert_eq!(audio.media_type, "audio");
        assert_eq!(audio.port, 49170);
        assert_eq!(audio.preferred_format, 0);
        assert_eq!(audio.address.unwrap().to_string(), "198.51.100.1");
        assert_eq!(audio.rtcp_port, Some(49171));
        assert_eq!(audio.formats.len(), 3);
        assert_eq!(audio.formats[2], (96, SmolStr::new_static("opus")));
    }

    #[test]
    fn media_level_connection_overrides_session() {
        let body = "v=0\r\n\
            c=IN IP4 198.51.100.1\r\n\
            m=audio 4000 RTP/AVP 0\r\n\
            m=video 4002 RTP/AVP 31\r\n\
            c=IN IP4 203.0.113.9\r\n";
        let media = media_descriptors(body);
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].address.unwrap().to_string(), "198.51.100.1");
        assert_eq!(media[1].address.unwrap().to_string(), "203.0.113.9");
    }

    #[test]
    fn non_rtp_media_is_skipped() {
        let body = "m=image 9 udptl t38\r\nm=audio 4000 RTP/AVP 0\r\n";
        let media = media_descriptors(body);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].media_type, "audio");
    }

    #[test]
    fn no_sdp_means_no_media() {
        assert!(media_descriptors("INVITE sip:b@h SIP/2.0\r\n\r\n").is_empty());
    }
}
