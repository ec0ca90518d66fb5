//! Proxy-chain headers.

use std::net::IpAddr;

use http::header::{HeaderName, HeaderValue};

use crate::headers::util::{
    comma_items, is_token, join_value, quote_if_needed, split_once_trim, unquote,
};
use crate::headers::{ParseHeaderError, TypedHeader};

/// One element of a `Forwarded` header: the parameters contributed by a
/// single proxy hop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardedElement {
    /// `for=`: the client the hop saw.
    pub forwarded_for: Option<String>,
    /// `by=`: the interface the hop received the request on.
    pub by: Option<String>,
    /// `host=`: the `Host` header the hop received.
    pub host: Option<String>,
    /// `proto=`: the scheme the hop received.
    pub proto: Option<String>,
}

impl ForwardedElement {
    fn parse_str(s: &str) -> Result<Self, ParseHeaderError> {
        let mut element = ForwardedElement::default();
        for pair in s.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = split_once_trim(pair, '=')
                .ok_or_else(|| ParseHeaderError::new(format!("invalid forwarded pair `{pair}`")))?;
            let value = unquote(value)?;
            match key.to_ascii_lowercase().as_str() {
                "for" => element.forwarded_for = Some(value),
                "by" => element.by = Some(value),
                "host" => element.host = Some(value),
                "proto" => element.proto = Some(value),
                other => {
                    if !is_token(other) {
                        return Err(ParseHeaderError::new(format!(
                            "invalid forwarded parameter `{other}`"
                        )));
                    }
                    // extension parameters are allowed and ignored
                }
            }
        }
        if element == ForwardedElement::default() {
            return Err(ParseHeaderError::new("empty forwarded element"));
        }
        Ok(element)
    }

    fn render(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(v) = &self.forwarded_for {
            pairs.push(format!("for={}", quote_if_needed(v)));
        }
        if let Some(v) = &self.by {
            pairs.push(format!("by={}", quote_if_needed(v)));
        }
        if let Some(v) = &self.host {
            pairs.push(format!("host={}", quote_if_needed(v)));
        }
        if let Some(v) = &self.proto {
            pairs.push(format!("proto={}", quote_if_needed(v)));
        }
        pairs.join(";")
    }
}

/// `Forwarded` (RFC 7239): the proxy chain, one element per hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forwarded(pub Vec<ForwardedElement>);

impl TypedHeader for Forwarded {
    fn name() -> &'static HeaderName {
        header_name!(http::header::FORWARDED)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty forwarded list"));
        }
        items
            .iter()
            .map(|item| ForwardedElement::parse_str(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Forwarded)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(ForwardedElement::render)));
    }
}

/// One `X-Forwarded-For` element: an address when it parses as one, else
/// the verbatim token (`unknown`, obfuscated identifiers).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardedPeer {
    /// A literal IP address.
    Address(IpAddr),
    /// Anything else the proxy wrote.
    Name(String),
}

/// `X-Forwarded-For`: the de-facto client chain, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XForwardedFor(pub Vec<ForwardedPeer>);

impl XForwardedFor {
    /// The first (client-most) address in the chain, if it is an address.
    pub fn client(&self) -> Option<IpAddr> {
        match self.0.first() {
            Some(ForwardedPeer::Address(addr)) => Some(*addr),
            _ => None,
        }
    }
}

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

impl TypedHeader for XForwardedFor {
    fn name() -> &'static HeaderName {
        &X_FORWARDED_FOR
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty forwarded-for list"));
        }
        let peers = items
            .into_iter()
            .map(|item| match item.parse::<IpAddr>() {
                Ok(addr) => ForwardedPeer::Address(addr),
                Err(_) => ForwardedPeer::Name(item),
            })
            .collect();
        Ok(XForwardedFor(peers))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|peer| match peer {
            ForwardedPeer::Address(addr) => addr.to_string(),
            ForwardedPeer::Name(name) => name.clone(),
        })));
    }
}

/// One `Via` element: protocol version, received-by, optional comment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViaElement {
    /// The received protocol, `1.1` or `HTTP/1.1`.
    pub protocol: String,
    /// The recipient: a host or pseudonym.
    pub by: String,
    /// The trailing comment, parentheses stripped.
    pub comment: Option<String>,
}

/// `Via`: intermediaries the message passed through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Via(pub Vec<ViaElement>);

impl TypedHeader for Via {
    fn name() -> &'static HeaderName {
        header_name!(http::header::VIA)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty via list"));
        }
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            let mut words = item.splitn(2, char::is_whitespace);
            let protocol = words
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ParseHeaderError::new("missing via protocol"))?
                .to_owned();
            let rest = words
                .next()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ParseHeaderError::new("missing via recipient"))?;
            let (by, comment) = match rest.split_once('(') {
                Some((by, comment)) => {
                    let comment = comment
                        .strip_suffix(')')
                        .ok_or_else(|| ParseHeaderError::new("unterminated via comment"))?;
                    (by.trim().to_owned(), Some(comment.to_owned()))
                }
                None => (rest.to_owned(), None),
            };
            elements.push(ViaElement {
                protocol,
                by,
                comment,
            });
        }
        Ok(Via(elements))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|element| {
            match &element.comment {
                Some(comment) => format!("{} {} ({comment})", element.protocol, element.by),
                None => format!("{} {}", element.protocol, element.by),
            }
        })));
    }
}
