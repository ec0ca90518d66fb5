//! The `Host` header.

use std::fmt;

use http::header::HeaderValue;
use http::uri::Authority;

use crate::headers::util::str_value;
use crate::headers::{ParseHeaderError, TypedHeader};

/// `Host`: the authority the request targets.
///
/// Parsed against the RFC 3986 authority grammar (host with an optional
/// port). This is *not* a URI: userinfo is rejected outright, and no
/// scheme or path may appear.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Host {
    host: String,
    port: Option<u16>,
}

impl Host {
    /// Build a host with an optional port.
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Result<Self, ParseHeaderError> {
        let host = host.into();
        let rendered = match port {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };
        parse_authority(&rendered)
    }

    /// The host, lowercased; IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

fn parse_authority(s: &str) -> Result<Host, ParseHeaderError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseHeaderError::new("empty host"));
    }
    if s.contains('@') {
        return Err(ParseHeaderError::new("userinfo is not allowed in Host"));
    }
    let authority: Authority = s
        .parse()
        .map_err(|_| ParseHeaderError::new(format!("invalid authority `{s}`")))?;
    let host = authority.host().to_ascii_lowercase();
    let host = if host.contains(':') && !host.starts_with('[') {
        // http::uri strips the brackets from IPv6 hosts, keep them for
        // faithful re-rendering
        format!("[{host}]")
    } else {
        host
    };
    Ok(Host {
        host,
        port: authority.port_u16(),
    })
}

impl TypedHeader for Host {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::HOST)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one host"));
        }
        parse_authority(str_value(&values[0])?)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(
            HeaderValue::from_str(&self.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
}
