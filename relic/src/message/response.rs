use std::fmt;

use http::StatusCode;

use crate::body::Body;
use crate::headers::{Headers, TypedHeader};

/// An immutable HTTP response.
///
/// The body's known length is authoritative for framing: a `Content-Length`
/// header set by hand is replaced at emission when the body knows better,
/// and a body of unknown length goes out chunked.
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
}

impl Response {
    /// Start building a response with the given status.
    pub fn builder(status: StatusCode) -> ResponseBuilder {
        ResponseBuilder {
            status,
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    /// `200 OK` with the given body.
    pub fn ok(body: Body) -> Response {
        Response::builder(StatusCode::OK).body(body).build()
    }

    /// `204 No Content`.
    pub fn no_content() -> Response {
        Response::builder(StatusCode::NO_CONTENT).build()
    }

    /// `304 Not Modified`.
    pub fn not_modified() -> Response {
        Response::builder(StatusCode::NOT_MODIFIED).build()
    }

    /// `400 Bad Request` with a plain-text body.
    pub fn bad_request() -> Response {
        Response::builder(StatusCode::BAD_REQUEST)
            .body(Body::from_text("Bad Request", None))
            .build()
    }

    /// `404 Not Found` with a plain-text body.
    pub fn not_found() -> Response {
        Response::builder(StatusCode::NOT_FOUND)
            .body(Body::from_text("Not Found", None))
            .build()
    }

    /// `500 Internal Server Error` with a generic plain-text body.
    pub fn internal_server_error() -> Response {
        Response::builder(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from_text("Internal Server Error", None))
            .build()
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The response body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Consume into the body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// A copy with the status replaced.
    pub fn with_status(mut self, status: StatusCode) -> Response {
        self.status = status;
        self
    }

    /// A copy with the headers replaced.
    pub fn with_headers(mut self, headers: Headers) -> Response {
        self.headers = headers;
        self
    }

    /// A copy with `value` encoded into the headers.
    pub fn with_header<H: TypedHeader>(mut self, value: &H) -> Response {
        self.headers = self.headers.with(value);
        self
    }

    /// A copy with the body replaced. The old body is dropped unread.
    pub fn with_body(mut self, body: Body) -> Response {
        self.body = body;
        self
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Accumulates the pieces of a [`Response`]. Created by
/// [`Response::builder`].
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Body,
}

impl ResponseBuilder {
    /// Set the headers wholesale.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Encode a typed header.
    pub fn header<H: TypedHeader>(mut self, value: &H) -> Self {
        self.headers = self.headers.with(value);
        self
    }

    /// Set the body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Freeze the response.
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}
