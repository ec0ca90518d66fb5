//! The typed header repertoire.
//!
//! One type per recognized header, each implementing
//! [`TypedHeader`](super::TypedHeader). The modules group headers by
//! concern; everything is re-exported flat from here.

mod accept;
mod authorization;
mod cache_control;
mod conditional;
mod content;
mod cookie;
mod date;
mod forwarded;
mod host;
mod range;
mod simple;

pub use self::accept::{
    Accept, AcceptEncoding, AcceptLanguage, AcceptRanges, EncodingPreference, LanguagePreference,
    MediaRange,
};
pub use self::authorization::{Authorization, Challenge, WwwAuthenticate};
pub use self::cache_control::CacheControl;
pub use self::conditional::{
    ETag, EntityTag, IfMatch, IfModifiedSince, IfNoneMatch, IfRange, IfUnmodifiedSince,
    LastModified, TagSet,
};
pub use self::content::{
    Coding, ContentDisposition, ContentEncoding, ContentLanguage, ContentLength, ContentRange,
    ContentType, TransferEncoding,
};
pub use self::cookie::{Cookie, SameSite, SetCookie, SetCookieValue};
pub use self::date::{Date, Expires, HttpDate, RetryAfter};
pub use self::forwarded::{Forwarded, ForwardedElement, ForwardedPeer, Via, ViaElement, XForwardedFor};
pub use self::host::Host;
pub use self::range::{ByteRangeSpec, Range};
pub use self::simple::{
    Allow, Connection, From, Location, Origin, Referer, Server, Upgrade, UserAgent, Vary,
    XPoweredBy,
};

use super::{HeaderError, Headers};

macro_rules! validate_headers {
    ($headers:expr, $($type:ty),* $(,)?) => {{
        $(
            let _ = $headers.get::<$type>()?;
        )*
        Ok(())
    }};
}

/// Run every recognized codec against the headers that are present.
pub(crate) fn validate_known(headers: &Headers) -> Result<(), HeaderError> {
    validate_headers!(
        headers,
        Accept,
        AcceptEncoding,
        AcceptLanguage,
        AcceptRanges,
        Allow,
        Authorization,
        CacheControl,
        Connection,
        ContentDisposition,
        ContentEncoding,
        ContentLanguage,
        ContentLength,
        ContentRange,
        ContentType,
        Cookie,
        Date,
        ETag,
        Expires,
        Forwarded,
        From,
        Host,
        IfMatch,
        IfModifiedSince,
        IfNoneMatch,
        IfRange,
        IfUnmodifiedSince,
        LastModified,
        Location,
        Origin,
        Range,
        Referer,
        RetryAfter,
        Server,
        SetCookie,
        TransferEncoding,
        Upgrade,
        UserAgent,
        Vary,
        Via,
        WwwAuthenticate,
        XForwardedFor,
        XPoweredBy,
    )
}

#[cfg(test)]
mod tests {
    use http::header::HeaderValue;

    use crate::headers::Headers;

    #[test]
    fn validate_known_accepts_clean_headers() {
        let headers = Headers::builder()
            .raw(http::header::HOST, HeaderValue::from_static("example.com"))
            .raw(http::header::CONTENT_LENGTH, HeaderValue::from_static("3"))
            .build();
        headers.validate_known().unwrap();
    }

    #[test]
    fn validate_known_flags_the_broken_one() {
        let headers = Headers::builder()
            .raw(http::header::HOST, HeaderValue::from_static("example.com"))
            .raw(http::header::RANGE, HeaderValue::from_static("pages=1-2"))
            .build();
        let err = headers.validate_known().unwrap_err();
        assert_eq!(err.name(), &http::header::RANGE);
    }

    #[test]
    fn unknown_headers_are_ignored() {
        let headers = Headers::builder()
            .raw(
                http::header::HeaderName::from_static("x-whatever"),
                HeaderValue::from_static("anything goes ,,; =="),
            )
            .build();
        headers.validate_known().unwrap();
    }
}
