use std::fmt;
use std::net::SocketAddr;

use http::{Method, Uri, Version};

use super::Token;
use crate::body::Body;
use crate::headers::Headers;
use crate::router::NormalizedPath;

/// What the transport knows about the peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The remote address, when the transport has one.
    pub peer_addr: Option<SocketAddr>,
    /// The local address the connection was accepted on.
    pub local_addr: Option<SocketAddr>,
}

/// An immutable HTTP request.
///
/// Two paths live here: [`url`](Request::url) is the path relative to the
/// current mount point and may be narrowed by routing;
/// [`requested_uri`](Request::requested_uri) is the target as received on
/// the wire and is never rewritten after construction.
pub struct Request {
    method: Method,
    url: NormalizedPath,
    query: Option<String>,
    requested_uri: Uri,
    version: Version,
    headers: Headers,
    body: Body,
    connection_info: ConnectionInfo,
    token: Token,
}

impl Request {
    /// Start building a request for `method` and `uri`.
    pub fn builder(method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder {
            method,
            uri,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Body::empty(),
            connection_info: ConnectionInfo::default(),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path relative to the current mount point.
    pub fn url(&self) -> &NormalizedPath {
        &self.url
    }

    /// The raw query string, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The original request target; never rewritten.
    pub fn requested_uri(&self) -> &Uri {
        &self.requested_uri
    }

    /// The protocol version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Transport-level peer information.
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    /// The identity of this request; survives every `with_*` copy.
    pub fn token(&self) -> Token {
        self.token
    }

    /// A copy with the mount-relative path replaced. The token and the
    /// original target are preserved.
    pub fn with_url(mut self, url: NormalizedPath) -> Request {
        self.url = url;
        self
    }

    /// A copy with the headers replaced.
    pub fn with_headers(mut self, headers: Headers) -> Request {
        self.headers = headers;
        self
    }

    /// A copy with the body replaced.
    pub fn with_body(mut self, body: Body) -> Request {
        self.body = body;
        self
    }

    /// A copy with the method replaced.
    pub fn with_method(mut self, method: Method) -> Request {
        self.method = method;
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.to_string())
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("token", &self.token)
            .finish()
    }
}

/// Accumulates the pieces of a [`Request`]. Created by
/// [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    version: Version,
    headers: Headers,
    body: Body,
    connection_info: ConnectionInfo,
}

impl RequestBuilder {
    /// Set the protocol version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set the transport information.
    pub fn connection_info(mut self, info: ConnectionInfo) -> Self {
        self.connection_info = info;
        self
    }

    /// Mint the token and freeze the request.
    pub fn build(self) -> Request {
        let url = NormalizedPath::parse(self.uri.path());
        let query = self.uri.query().map(str::to_owned);
        Request {
            method: self.method,
            url,
            query,
            requested_uri: self.uri,
            version: self.version,
            headers: self.headers,
            body: self.body,
            connection_info: self.connection_info,
            token: Token::mint(),
        }
    }
}
