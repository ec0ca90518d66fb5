//! Token- and string-valued headers.

use http::header::{HeaderName, HeaderValue};
use http::{Method, Uri};

use crate::headers::util::{comma_items, is_token, join_value, str_value};
use crate::headers::{ParseHeaderError, TypedHeader};

/// `Allow`: the methods the resource supports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allow(pub Vec<Method>);

impl TypedHeader for Allow {
    fn name() -> &'static HeaderName {
        header_name!(http::header::ALLOW)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        items
            .iter()
            .map(|item| {
                Method::from_bytes(item.as_bytes())
                    .map_err(|_| ParseHeaderError::new(format!("invalid method `{item}`")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Allow)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|m| m.as_str().to_owned())));
    }
}

/// `Connection`: hop-by-hop control tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection(pub Vec<String>);

impl Connection {
    /// The `close` directive.
    pub fn close() -> Self {
        Connection(vec!["close".to_owned()])
    }

    /// The `keep-alive` directive.
    pub fn keep_alive() -> Self {
        Connection(vec!["keep-alive".to_owned()])
    }

    /// Whether `close` is present.
    pub fn is_close(&self) -> bool {
        self.has("close")
    }

    /// Whether the given token is present (case-insensitive).
    pub fn has(&self, token: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(token))
    }
}

impl TypedHeader for Connection {
    fn name() -> &'static HeaderName {
        header_name!(http::header::CONNECTION)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty connection header"));
        }
        for item in &items {
            if !is_token(item) {
                return Err(ParseHeaderError::new(format!(
                    "invalid connection token `{item}`"
                )));
            }
        }
        Ok(Connection(
            items.iter().map(|i| i.to_ascii_lowercase()).collect(),
        ))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().cloned()));
    }
}

/// `Upgrade`: protocols the sender is willing to switch to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upgrade(pub Vec<String>);

impl Upgrade {
    /// Whether the given protocol is offered (case-insensitive).
    pub fn offers(&self, protocol: &str) -> bool {
        self.0.iter().any(|p| p.eq_ignore_ascii_case(protocol))
    }
}

impl TypedHeader for Upgrade {
    fn name() -> &'static HeaderName {
        header_name!(http::header::UPGRADE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty upgrade header"));
        }
        for item in &items {
            // protocol-name ["/" protocol-version]
            let valid = match item.split_once('/') {
                Some((name, version)) => is_token(name) && is_token(version),
                None => is_token(item),
            };
            if !valid {
                return Err(ParseHeaderError::new(format!(
                    "invalid upgrade protocol `{item}`"
                )));
            }
        }
        Ok(Upgrade(items))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().cloned()));
    }
}

/// `Vary`: which request headers the response varies on, or `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Vary {
    /// `*`: varies on something beyond headers.
    Any,
    /// A list of header names.
    Headers(Vec<HeaderName>),
}

impl TypedHeader for Vary {
    fn name() -> &'static HeaderName {
        header_name!(http::header::VARY)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.iter().any(|i| i == "*") {
            if items.len() != 1 {
                return Err(ParseHeaderError::new("`*` cannot be combined with names"));
            }
            return Ok(Vary::Any);
        }
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty vary header"));
        }
        items
            .iter()
            .map(|item| {
                item.parse::<HeaderName>()
                    .map_err(|_| ParseHeaderError::new(format!("invalid header name `{item}`")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Vary::Headers)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        match self {
            Vary::Any => values.push(HeaderValue::from_static("*")),
            Vary::Headers(names) => values.push(join_value(
                names.iter().map(|n| n.as_str().to_owned()),
            )),
        }
    }
}

macro_rules! uri_header {
    ($(#[$doc:meta])* $type:ident, $name:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $type(pub Uri);

        impl $type {
            /// The carried URI.
            pub fn uri(&self) -> &Uri {
                &self.0
            }
        }

        impl TypedHeader for $type {
            fn name() -> &'static HeaderName {
                header_name!($name)
            }

            fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
                if values.len() != 1 {
                    return Err(ParseHeaderError::new("expected exactly one value"));
                }
                str_value(&values[0])?
                    .trim()
                    .parse::<Uri>()
                    .map($type)
                    .map_err(|e| ParseHeaderError::new(format!("invalid URI: {e}")))
            }

            fn encode(&self, values: &mut Vec<HeaderValue>) {
                values.push(
                    HeaderValue::from_str(&self.0.to_string())
                        .unwrap_or_else(|_| HeaderValue::from_static("/")),
                );
            }
        }
    };
}

uri_header! {
    /// `Location`: where the client should go next; absolute or relative.
    Location, http::header::LOCATION
}

uri_header! {
    /// `Referer`: the address the request came from.
    Referer, http::header::REFERER
}

/// `Origin`: the scheme/host/port the request originated from, or `null`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// The opaque `null` origin.
    Null,
    /// A concrete origin.
    Origin {
        /// `http` or `https`.
        scheme: String,
        /// The host.
        host: String,
        /// The explicit port, if any.
        port: Option<u16>,
    },
}

impl TypedHeader for Origin {
    fn name() -> &'static HeaderName {
        header_name!(http::header::ORIGIN)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        if s == "null" {
            return Ok(Origin::Null);
        }
        let uri: Uri = s
            .parse()
            .map_err(|e| ParseHeaderError::new(format!("invalid origin: {e}")))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| ParseHeaderError::new("origin lacks a scheme"))?
            .to_owned();
        let host = uri
            .host()
            .ok_or_else(|| ParseHeaderError::new("origin lacks a host"))?
            .to_owned();
        if uri.path() != "/" && !uri.path().is_empty() {
            return Err(ParseHeaderError::new("origin must not carry a path"));
        }
        Ok(Origin::Origin {
            scheme,
            host,
            port: uri.port_u16(),
        })
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let rendered = match self {
            Origin::Null => "null".to_owned(),
            Origin::Origin { scheme, host, port } => match port {
                Some(port) => format!("{scheme}://{host}:{port}"),
                None => format!("{scheme}://{host}"),
            },
        };
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("null")),
        );
    }
}

macro_rules! string_header {
    ($(#[$doc:meta])* $type:ident, $name:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $type(String);

        impl $type {
            /// Wrap a value, validating it is a legal single-line header
            /// value.
            pub fn new(value: impl Into<String>) -> Result<Self, ParseHeaderError> {
                let value = value.into();
                if HeaderValue::from_str(&value).is_err() {
                    return Err(ParseHeaderError::new("value contains illegal bytes"));
                }
                Ok($type(value))
            }

            /// The carried string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TypedHeader for $type {
            fn name() -> &'static HeaderName {
                header_name!($name)
            }

            fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
                if values.len() != 1 {
                    return Err(ParseHeaderError::new("expected exactly one value"));
                }
                let s = str_value(&values[0])?.trim();
                if s.is_empty() {
                    return Err(ParseHeaderError::new("empty value"));
                }
                Ok($type(s.to_owned()))
            }

            fn encode(&self, values: &mut Vec<HeaderValue>) {
                // `new` validated the bytes
                values.push(HeaderValue::from_str(&self.0).unwrap());
            }
        }
    };
}

string_header! {
    /// `Server`: the software answering the request.
    Server, http::header::SERVER
}

string_header! {
    /// `User-Agent`: the software issuing the request.
    UserAgent, http::header::USER_AGENT
}

string_header! {
    /// `From`: a mailbox for the human behind the request.
    From, http::header::FROM
}

static X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// `X-Powered-By`: the framework badge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XPoweredBy(String);

impl XPoweredBy {
    /// Wrap a value, validating it is a legal header value.
    pub fn new(value: impl Into<String>) -> Result<Self, ParseHeaderError> {
        let value = value.into();
        if HeaderValue::from_str(&value).is_err() {
            return Err(ParseHeaderError::new("value contains illegal bytes"));
        }
        Ok(XPoweredBy(value))
    }

    /// The carried string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TypedHeader for XPoweredBy {
    fn name() -> &'static HeaderName {
        &X_POWERED_BY
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        Ok(XPoweredBy(str_value(&values[0])?.trim().to_owned()))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(HeaderValue::from_str(&self.0).unwrap());
    }
}
