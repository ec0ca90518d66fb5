//! Date-valued headers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::header::HeaderValue;

use crate::headers::util::str_value;
use crate::headers::{ParseHeaderError, TypedHeader};

/// A timestamp at the one-second resolution of the HTTP date format
/// (RFC 7231 IMF-fixdate on output; the obsolete RFC 850 and asctime
/// forms are accepted on input).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpDate(SystemTime);

impl HttpDate {
    /// The current time, truncated to seconds.
    pub fn now() -> Self {
        HttpDate::from(SystemTime::now())
    }

    /// The wrapped timestamp.
    pub fn into_system_time(self) -> SystemTime {
        self.0
    }

    pub(crate) fn parse_str(s: &str) -> Result<Self, ParseHeaderError> {
        httpdate::parse_http_date(s.trim())
            .map(HttpDate)
            .map_err(|_| ParseHeaderError::new(format!("invalid HTTP date `{s}`")))
    }

    pub(crate) fn to_value(self) -> HeaderValue {
        HeaderValue::from_str(&httpdate::fmt_http_date(self.0))
            .unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

impl From<SystemTime> for HttpDate {
    fn from(time: SystemTime) -> Self {
        // truncate sub-second precision so comparisons against parsed
        // header dates are exact
        let seconds = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        HttpDate(UNIX_EPOCH + Duration::from_secs(seconds))
    }
}

pub(crate) fn parse_single_date(
    values: &[HeaderValue],
) -> Result<HttpDate, ParseHeaderError> {
    if values.len() != 1 {
        return Err(ParseHeaderError::new("expected exactly one date value"));
    }
    HttpDate::parse_str(str_value(&values[0])?)
}

macro_rules! date_header {
    ($(#[$doc:meta])* $type:ident, $name:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $type(pub HttpDate);

        impl $type {
            /// The carried timestamp.
            pub fn date(&self) -> HttpDate {
                self.0
            }
        }

        impl From<SystemTime> for $type {
            fn from(time: SystemTime) -> Self {
                $type(HttpDate::from(time))
            }
        }

        impl TypedHeader for $type {
            fn name() -> &'static http::header::HeaderName {
                header_name!($name)
            }

            fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
                parse_single_date(values).map($type)
            }

            fn encode(&self, values: &mut Vec<HeaderValue>) {
                values.push(self.0.to_value());
            }
        }
    };
}

date_header! {
    /// `Date`: when the message originated.
    Date, http::header::DATE
}

date_header! {
    /// `Expires`: when the response is to be considered stale.
    Expires, http::header::EXPIRES
}

pub(crate) use date_header;

/// `Retry-After`: either an absolute date or a delay in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAfter {
    /// Retry at the given time.
    Date(HttpDate),
    /// Retry after the given number of seconds.
    Delay(Duration),
}

impl TypedHeader for RetryAfter {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::RETRY_AFTER)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        if s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty() {
            let seconds: u64 = s
                .parse()
                .map_err(|_| ParseHeaderError::new("delay out of range"))?;
            Ok(RetryAfter::Delay(Duration::from_secs(seconds)))
        } else {
            HttpDate::parse_str(s).map(RetryAfter::Date)
        }
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        match self {
            RetryAfter::Date(date) => values.push(date.to_value()),
            RetryAfter::Delay(delay) => values.push(
                HeaderValue::from_str(&delay.as_secs().to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("0")),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let date = Date(HttpDate::now());
        let mut values = Vec::new();
        date.encode(&mut values);
        assert_eq!(Date::parse(&values).unwrap(), date);
    }

    #[test]
    fn accepts_imf_fixdate() {
        let values = [HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT")];
        Date::parse(&values).unwrap();
    }

    #[test]
    fn rejects_garbage() {
        let values = [HeaderValue::from_static("yesterday")];
        assert!(Date::parse(&values).is_err());
    }

    #[test]
    fn retry_after_forms() {
        let values = [HeaderValue::from_static("120")];
        assert_eq!(
            RetryAfter::parse(&values).unwrap(),
            RetryAfter::Delay(Duration::from_secs(120))
        );

        let values = [HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT")];
        assert!(matches!(
            RetryAfter::parse(&values).unwrap(),
            RetryAfter::Date(_)
        ));
    }

    #[test]
    fn sub_second_precision_is_dropped() {
        let a = HttpDate::from(UNIX_EPOCH + Duration::from_millis(1500));
        let b = HttpDate::from(UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(a, b);
    }
}
