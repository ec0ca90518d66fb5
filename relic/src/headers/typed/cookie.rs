//! Cookie headers.

use std::fmt;
use std::time::Duration;

use http::header::HeaderValue;

use super::date::HttpDate;
use crate::headers::util::{split_once_trim, str_value};
use crate::headers::{ParseHeaderError, TypedHeader};

fn valid_cookie_name(name: &str) -> bool {
    crate::headers::util::is_token(name)
}

fn valid_cookie_value(value: &str) -> bool {
    // RFC 6265 cookie-octet, optionally wrapped in double quotes
    value.bytes().all(|b| {
        matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E | b'"')
    })
}

/// `Cookie`: the cookies a client sends back, as name/value pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie(pub Vec<(String, String)>);

impl Cookie {
    /// The first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl TypedHeader for Cookie {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::COOKIE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let mut pairs = Vec::new();
        for value in values {
            // cookie pairs are separated by `;`, not commas
            for pair in str_value(value)?.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| ParseHeaderError::new(format!("cookie pair `{pair}` lacks `=`")))?;
                let (name, value) = (name.trim(), value.trim());
                if !valid_cookie_name(name) || !valid_cookie_value(value) {
                    return Err(ParseHeaderError::new(format!("invalid cookie pair `{pair}`")));
                }
                pairs.push((name.to_owned(), value.to_owned()));
            }
        }
        if pairs.is_empty() {
            return Err(ParseHeaderError::new("empty cookie header"));
        }
        Ok(Cookie(pairs))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let rendered = self
            .0
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
}

/// The `SameSite` attribute of a `Set-Cookie`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    /// `Strict`.
    Strict,
    /// `Lax`.
    Lax,
    /// `None` (requires `Secure`).
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

/// One `Set-Cookie` value: a pair plus its attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCookieValue {
    /// The cookie name.
    pub name: String,
    /// The cookie value.
    pub value: String,
    /// `Expires` attribute.
    pub expires: Option<HttpDate>,
    /// `Max-Age` attribute.
    pub max_age: Option<Duration>,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// `Path` attribute.
    pub path: Option<String>,
    /// `Secure` flag.
    pub secure: bool,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// `SameSite` attribute.
    pub same_site: Option<SameSite>,
}

impl SetCookieValue {
    /// A bare cookie with no attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        SetCookieValue {
            name: name.into(),
            value: value.into(),
            expires: None,
            max_age: None,
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    fn parse_str(s: &str) -> Result<Self, ParseHeaderError> {
        let mut parts = s.split(';');
        let pair = parts
            .next()
            .ok_or_else(|| ParseHeaderError::new("empty set-cookie"))?;
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| ParseHeaderError::new("set-cookie lacks `=`"))?;
        let (name, value) = (name.trim(), value.trim());
        if !valid_cookie_name(name) || !valid_cookie_value(value) {
            return Err(ParseHeaderError::new(format!(
                "invalid set-cookie pair `{pair}`"
            )));
        }
        let mut cookie = SetCookieValue::new(name, value);
        for attribute in parts {
            let attribute = attribute.trim();
            match split_once_trim(attribute, '=') {
                Some((key, argument)) => match key.to_ascii_lowercase().as_str() {
                    "expires" => cookie.expires = Some(HttpDate::parse_str(argument)?),
                    "max-age" => {
                        let secs: i64 = argument.parse().map_err(|_| {
                            ParseHeaderError::new(format!("invalid Max-Age `{argument}`"))
                        })?;
                        cookie.max_age = Some(Duration::from_secs(secs.max(0) as u64));
                    }
                    "domain" => cookie.domain = Some(argument.to_owned()),
                    "path" => cookie.path = Some(argument.to_owned()),
                    "samesite" => {
                        cookie.same_site = Some(match argument.to_ascii_lowercase().as_str() {
                            "strict" => SameSite::Strict,
                            "lax" => SameSite::Lax,
                            "none" => SameSite::None,
                            other => {
                                return Err(ParseHeaderError::new(format!(
                                    "invalid SameSite `{other}`"
                                )))
                            }
                        })
                    }
                    _ => {}
                },
                None => match attribute.to_ascii_lowercase().as_str() {
                    "secure" => cookie.secure = true,
                    "httponly" => cookie.http_only = true,
                    _ => {}
                },
            }
        }
        Ok(cookie)
    }

    fn render(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(expires) = self.expires {
            out.push_str("; Expires=");
            out.push_str(&httpdate::fmt_http_date(expires.into_system_time()));
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }
}

/// `Set-Cookie`: cookies the server installs. Encodes as one raw value per
/// cookie; `Set-Cookie` is the one header that must never be comma-joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCookie(pub Vec<SetCookieValue>);

impl TypedHeader for SetCookie {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::SET_COOKIE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let cookies = values
            .iter()
            .map(|value| SetCookieValue::parse_str(str_value(value)?))
            .collect::<Result<Vec<_>, _>>()?;
        if cookies.is_empty() {
            return Err(ParseHeaderError::new("empty set-cookie header"));
        }
        Ok(SetCookie(cookies))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        for cookie in &self.0 {
            values.push(
                HeaderValue::from_str(&cookie.render())
                    .unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_pairs() {
        let values = [HeaderValue::from_static("sid=abc123; theme=dark")];
        let cookie = Cookie::parse(&values).unwrap();
        assert_eq!(cookie.get("sid"), Some("abc123"));
        assert_eq!(cookie.get("theme"), Some("dark"));
        assert_eq!(cookie.get("missing"), None);
    }

    #[test]
    fn cookie_round_trip() {
        let cookie = Cookie(vec![("a".to_owned(), "1".to_owned())]);
        let mut values = Vec::new();
        cookie.encode(&mut values);
        assert_eq!(Cookie::parse(&values).unwrap(), cookie);
    }

    #[test]
    fn set_cookie_attributes() {
        let values = [HeaderValue::from_static(
            "sid=abc; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=3600",
        )];
        let header = SetCookie::parse(&values).unwrap();
        let cookie = &header.0[0];
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
        assert_eq!(cookie.max_age, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn set_cookie_one_value_per_cookie() {
        let header = SetCookie(vec![
            SetCookieValue::new("a", "1"),
            SetCookieValue::new("b", "2"),
        ]);
        let mut values = Vec::new();
        header.encode(&mut values);
        assert_eq!(values.len(), 2);
        assert_eq!(SetCookie::parse(&values).unwrap(), header);
    }

    #[test]
    fn malformed_pair_fails() {
        let values = [HeaderValue::from_static("just-a-token")];
        assert!(Cookie::parse(&values).is_err());
    }
}
