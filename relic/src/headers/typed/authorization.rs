//! Credential headers.
//!
//! `Authorization` keeps its secrets out of `Debug` output: rendering a
//! request for a log line must never leak a password or token.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::HeaderValue;

use crate::headers::util::{comma_items, is_token, quote_if_needed, str_value, unquote};
use crate::headers::{ParseHeaderError, TypedHeader};

/// `Authorization`: credentials for the requested resource.
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    /// `Basic` credentials: a username and password.
    Basic {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
    /// `Bearer` token credentials.
    Bearer {
        /// The opaque token.
        token: String,
    },
    /// `Digest` credentials, kept as their parameter list.
    Digest {
        /// The digest parameters (`username`, `realm`, `nonce`, …) in order.
        params: Vec<(String, String)>,
    },
}

impl Authorization {
    /// Build `Basic` credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Authorization::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build `Bearer` credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Authorization::Bearer {
            token: token.into(),
        }
    }

    /// The authentication scheme name.
    pub fn scheme(&self) -> &'static str {
        match self {
            Authorization::Basic { .. } => "Basic",
            Authorization::Bearer { .. } => "Bearer",
            Authorization::Digest { .. } => "Digest",
        }
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secrets are masked, only their presence is shown
        match self {
            Authorization::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"*****")
                .finish(),
            Authorization::Bearer { .. } => {
                f.debug_struct("Bearer").field("token", &"*****").finish()
            }
            Authorization::Digest { params } => {
                let masked: Vec<(&str, &str)> = params
                    .iter()
                    .map(|(k, v)| {
                        if k == "response" || k == "cnonce" {
                            (k.as_str(), "*****")
                        } else {
                            (k.as_str(), v.as_str())
                        }
                    })
                    .collect();
                f.debug_struct("Digest").field("params", &masked).finish()
            }
        }
    }
}

impl TypedHeader for Authorization {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::AUTHORIZATION)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        let (scheme, rest) = match s.split_once(' ') {
            Some((scheme, rest)) => (scheme, rest.trim()),
            None => (s, ""),
        };
        match scheme.to_ascii_lowercase().as_str() {
            "basic" => {
                let decoded = BASE64
                    .decode(rest)
                    .map_err(|_| ParseHeaderError::new("invalid base64 in Basic credentials"))?;
                let decoded = String::from_utf8(decoded)
                    .map_err(|_| ParseHeaderError::new("Basic credentials are not UTF-8"))?;
                let (username, password) = decoded
                    .split_once(':')
                    .ok_or_else(|| ParseHeaderError::new("Basic credentials lack a `:`"))?;
                Ok(Authorization::Basic {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })
            }
            "bearer" => {
                if rest.is_empty() {
                    return Err(ParseHeaderError::new("empty Bearer token"));
                }
                Ok(Authorization::Bearer {
                    token: rest.to_owned(),
                })
            }
            "digest" => {
                let params = parse_auth_params(rest)?;
                if params.is_empty() {
                    return Err(ParseHeaderError::new("empty Digest parameter list"));
                }
                Ok(Authorization::Digest { params })
            }
            other => Err(ParseHeaderError::new(format!(
                "unsupported authorization scheme `{other}`"
            ))),
        }
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let rendered = match self {
            Authorization::Basic { username, password } => {
                format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
            }
            Authorization::Bearer { token } => format!("Bearer {token}"),
            Authorization::Digest { params } => {
                format!("Digest {}", render_auth_params(params))
            }
        };
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
}

/// One `WWW-Authenticate` challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    /// The scheme (`Basic`, `Bearer`, `Digest`, …).
    pub scheme: String,
    /// The challenge parameters (`realm`, `charset`, …) in order.
    pub params: Vec<(String, String)>,
}

impl Challenge {
    /// A `Basic` challenge for the given realm.
    pub fn basic(realm: impl Into<String>) -> Self {
        Challenge {
            scheme: "Basic".to_owned(),
            params: vec![("realm".to_owned(), realm.into())],
        }
    }

    /// The `realm` parameter, if present.
    pub fn realm(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == "realm")
            .map(|(_, v)| v.as_str())
    }
}

/// `WWW-Authenticate`: challenges describing how to authenticate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WwwAuthenticate(pub Vec<Challenge>);

impl TypedHeader for WwwAuthenticate {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::WWW_AUTHENTICATE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        // commas separate both challenges and challenge parameters; an item
        // beginning with a scheme token (no `=`) opens a new challenge
        let mut challenges: Vec<Challenge> = Vec::new();
        for item in comma_items(values)? {
            let starts_challenge = match item.split_once(' ') {
                Some((first, _)) => is_token(first),
                None => is_token(&item),
            };
            if starts_challenge && !item.contains('=') || starts_challenge && item.contains(' ') {
                let (scheme, rest) = match item.split_once(' ') {
                    Some((scheme, rest)) => (scheme.to_owned(), rest.trim()),
                    None => (item.clone(), ""),
                };
                let params = if rest.is_empty() {
                    Vec::new()
                } else {
                    parse_auth_params(rest)?
                };
                challenges.push(Challenge { scheme, params });
            } else {
                let current = challenges
                    .last_mut()
                    .ok_or_else(|| ParseHeaderError::new("parameter before any scheme"))?;
                current.params.extend(parse_auth_params(&item)?);
            }
        }
        if challenges.is_empty() {
            return Err(ParseHeaderError::new("empty challenge list"));
        }
        Ok(WwwAuthenticate(challenges))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let rendered = self
            .0
            .iter()
            .map(|challenge| {
                if challenge.params.is_empty() {
                    challenge.scheme.clone()
                } else {
                    format!(
                        "{} {}",
                        challenge.scheme,
                        render_auth_params(&challenge.params)
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
}

fn parse_auth_params(s: &str) -> Result<Vec<(String, String)>, ParseHeaderError> {
    let mut params = Vec::new();
    for raw in split_unquoted_commas(s) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| ParseHeaderError::new(format!("invalid auth parameter `{raw}`")))?;
        let key = key.trim();
        if !is_token(key) {
            return Err(ParseHeaderError::new(format!(
                "invalid auth parameter name `{key}`"
            )));
        }
        params.push((key.to_ascii_lowercase(), unquote(value.trim())?));
    }
    Ok(params)
}

fn render_auth_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", quote_if_needed(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_unquoted_commas(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            _ if escaped => {
                escaped = false;
                current.push(c);
            }
            '\\' if quoted => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_round_trip() {
        let auth = Authorization::basic("aladdin", "opensesame");
        let mut values = Vec::new();
        auth.encode(&mut values);
        assert_eq!(values[0].to_str().unwrap(), "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
        assert_eq!(Authorization::parse(&values).unwrap(), auth);
    }

    #[test]
    fn bearer_round_trip() {
        let auth = Authorization::bearer("tok-123");
        let mut values = Vec::new();
        auth.encode(&mut values);
        assert_eq!(Authorization::parse(&values).unwrap(), auth);
    }

    #[test]
    fn digest_params() {
        let values = [HeaderValue::from_static(
            r#"Digest username="mufasa", realm="http-auth", nonce="abc", response="def""#,
        )];
        let auth = Authorization::parse(&values).unwrap();
        match &auth {
            Authorization::Digest { params } => {
                assert_eq!(params[0], ("username".to_owned(), "mufasa".to_owned()));
                assert_eq!(params.len(), 4);
            }
            other => panic!("expected digest, got {other:?}"),
        }
    }

    #[test]
    fn debug_masks_secrets() {
        let basic = format!("{:?}", Authorization::basic("user", "hunter2"));
        assert!(!basic.contains("hunter2"));
        assert!(basic.contains("user"));

        let bearer = format!("{:?}", Authorization::bearer("tok-123"));
        assert!(!bearer.contains("tok-123"));
    }

    #[test]
    fn unknown_scheme_fails() {
        let values = [HeaderValue::from_static("Negotiate abc")];
        assert!(Authorization::parse(&values).is_err());
    }

    #[test]
    fn www_authenticate_single_challenge() {
        let values = [HeaderValue::from_static(r#"Basic realm="visible site""#)];
        let header = WwwAuthenticate::parse(&values).unwrap();
        assert_eq!(header.0.len(), 1);
        assert_eq!(header.0[0].scheme, "Basic");
        assert_eq!(header.0[0].realm(), Some("visible site"));

        let mut encoded = Vec::new();
        header.encode(&mut encoded);
        assert_eq!(WwwAuthenticate::parse(&encoded).unwrap(), header);
    }

    #[test]
    fn www_authenticate_parameter_continuation() {
        let values = [HeaderValue::from_static(
            r#"Digest realm="a", nonce="n", Basic realm="b""#,
        )];
        let header = WwwAuthenticate::parse(&values).unwrap();
        assert_eq!(header.0.len(), 2);
        assert_eq!(header.0[0].params.len(), 2);
        assert_eq!(header.0[1].realm(), Some("b"));
    }
}
