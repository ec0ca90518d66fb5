//! Proactive negotiation headers.

use http::header::HeaderValue;
use mime::Mime;

use super::content::Coding;
use crate::headers::util::{comma_items, join_value, str_value, Quality};
use crate::headers::{ParseHeaderError, TypedHeader};

/// One `Accept` element: a media range with its quality weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRange {
    mime: Mime,
    quality: Quality,
}

impl MediaRange {
    /// A range at the default weight.
    pub fn new(mime: Mime) -> Self {
        MediaRange {
            mime,
            quality: Quality::MAX,
        }
    }

    /// The media range, possibly with `*` components.
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// The quality weight.
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Whether this range accepts the concrete media type `offer`.
    pub fn accepts(&self, offer: &Mime) -> bool {
        if self.quality == Quality::ZERO {
            return false;
        }
        let type_ok = self.mime.type_() == mime::STAR || self.mime.type_() == offer.type_();
        let subtype_ok =
            self.mime.subtype() == mime::STAR || self.mime.subtype() == offer.subtype();
        type_ok && subtype_ok
    }
}

/// `Accept`: media ranges the client is prepared to receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accept(pub Vec<MediaRange>);

impl Accept {
    /// Whether any listed range accepts `offer` with a nonzero weight.
    pub fn accepts(&self, offer: &Mime) -> bool {
        self.0.iter().any(|range| range.accepts(offer))
    }
}

impl TypedHeader for Accept {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::ACCEPT)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty accept list"));
        }
        let mut ranges = Vec::with_capacity(items.len());
        for item in items {
            let mime: Mime = item
                .parse()
                .map_err(|e| ParseHeaderError::new(format!("invalid media range `{item}`: {e}")))?;
            let quality = match mime.get_param("q") {
                Some(q) => Quality::parse(q.as_str())?,
                None => Quality::MAX,
            };
            // strip the weight parameter, it is negotiation metadata and
            // not part of the media range itself
            let essence: Mime = {
                let without_q: String = item
                    .split(';')
                    .filter(|p| {
                        !p.trim()
                            .to_ascii_lowercase()
                            .starts_with("q=")
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                without_q
                    .parse()
                    .map_err(|e| ParseHeaderError::new(format!("invalid media range: {e}")))?
            };
            ranges.push(MediaRange {
                mime: essence,
                quality,
            });
        }
        Ok(Accept(ranges))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|range| {
            match range.quality.render() {
                Some(q) => format!("{}; {q}", range.mime),
                None => range.mime.to_string(),
            }
        })));
    }
}

/// One `Accept-Encoding` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodingPreference {
    /// The coding, possibly [`Coding::Any`].
    pub coding: Coding,
    /// The quality weight.
    pub quality: Quality,
}

/// `Accept-Encoding`: content codings the client can decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptEncoding(pub Vec<EncodingPreference>);

impl AcceptEncoding {
    /// Whether the given coding is acceptable with a nonzero weight.
    pub fn allows(&self, coding: &Coding) -> bool {
        let mut wildcard = None;
        for pref in &self.0 {
            if pref.coding == *coding {
                return pref.quality != Quality::ZERO;
            }
            if pref.coding == Coding::Any {
                wildcard = Some(pref.quality != Quality::ZERO);
            }
        }
        wildcard.unwrap_or(false)
    }
}

impl TypedHeader for AcceptEncoding {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::ACCEPT_ENCODING)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        let mut preferences = Vec::with_capacity(items.len());
        for item in items {
            let (token, quality) = split_quality(&item)?;
            preferences.push(EncodingPreference {
                coding: Coding::parse_token(token)?,
                quality,
            });
        }
        Ok(AcceptEncoding(preferences))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|pref| {
            match pref.quality.render() {
                Some(q) => format!("{}; {q}", pref.coding.token()),
                None => pref.coding.token().to_owned(),
            }
        })));
    }
}

/// One `Accept-Language` element: a language range with its weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguagePreference {
    /// A language range (`en-US`, `en`, `*`).
    pub range: String,
    /// The quality weight.
    pub quality: Quality,
}

/// `Accept-Language`: natural languages the client prefers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptLanguage(pub Vec<LanguagePreference>);

impl TypedHeader for AcceptLanguage {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::ACCEPT_LANGUAGE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty language list"));
        }
        let mut preferences = Vec::with_capacity(items.len());
        for item in items {
            let (range, quality) = split_quality(&item)?;
            let valid = range == "*"
                || range
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-');
            if range.is_empty() || !valid {
                return Err(ParseHeaderError::new(format!(
                    "invalid language range `{range}`"
                )));
            }
            preferences.push(LanguagePreference {
                range: range.to_owned(),
                quality,
            });
        }
        Ok(AcceptLanguage(preferences))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().map(|pref| {
            match pref.quality.render() {
                Some(q) => format!("{}; {q}", pref.range),
                None => pref.range.clone(),
            }
        })));
    }
}

/// `Accept-Ranges`: range units the server supports for the resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptRanges {
    /// `bytes`.
    Bytes,
    /// `none`: range requests are refused.
    None,
}

impl TypedHeader for AcceptRanges {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::ACCEPT_RANGES)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        match str_value(&values[0])?.trim() {
            "bytes" => Ok(AcceptRanges::Bytes),
            "none" => Ok(AcceptRanges::None),
            other => Err(ParseHeaderError::new(format!(
                "unsupported range unit `{other}`"
            ))),
        }
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(HeaderValue::from_static(match self {
            AcceptRanges::Bytes => "bytes",
            AcceptRanges::None => "none",
        }));
    }
}

/// Split `token; q=…` into the bare item and its weight.
fn split_quality(item: &str) -> Result<(&str, Quality), ParseHeaderError> {
    match item.split_once(';') {
        Some((token, params)) => {
            let params = params.trim();
            let quality = match params.strip_prefix("q=").or_else(|| params.strip_prefix("Q=")) {
                Some(q) => Quality::parse(q)?,
                None => {
                    return Err(ParseHeaderError::new(format!(
                        "unexpected parameter `{params}`"
                    )))
                }
            };
            Ok((token.trim(), quality))
        }
        None => Ok((item.trim(), Quality::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_matching() {
        let values = [HeaderValue::from_static(
            "text/html, application/*;q=0.5, */*;q=0.1",
        )];
        let accept = Accept::parse(&values).unwrap();
        assert!(accept.accepts(&mime::TEXT_HTML));
        assert!(accept.accepts(&mime::APPLICATION_JSON));
        assert!(accept.accepts(&mime::IMAGE_PNG));
    }

    #[test]
    fn zero_quality_refuses() {
        let values = [HeaderValue::from_static("application/json;q=0")];
        let accept = Accept::parse(&values).unwrap();
        assert!(!accept.accepts(&mime::APPLICATION_JSON));
    }

    #[test]
    fn accept_round_trip() {
        let values = [HeaderValue::from_static("text/html, application/json; q=0.8")];
        let accept = Accept::parse(&values).unwrap();
        let mut encoded = Vec::new();
        accept.encode(&mut encoded);
        assert_eq!(Accept::parse(&encoded).unwrap(), accept);
    }

    #[test]
    fn accept_encoding_wildcard() {
        let values = [HeaderValue::from_static("gzip;q=0.8, *;q=0.1")];
        let ae = AcceptEncoding::parse(&values).unwrap();
        assert!(ae.allows(&Coding::Gzip));
        assert!(ae.allows(&Coding::Brotli));

        let values = [HeaderValue::from_static("gzip, identity;q=0")];
        let ae = AcceptEncoding::parse(&values).unwrap();
        assert!(!ae.allows(&Coding::Identity));
        assert!(!ae.allows(&Coding::Brotli));
    }

    #[test]
    fn accept_language_round_trip() {
        let values = [HeaderValue::from_static("en-US, en;q=0.7, *;q=0.1")];
        let al = AcceptLanguage::parse(&values).unwrap();
        assert_eq!(al.0.len(), 3);
        let mut encoded = Vec::new();
        al.encode(&mut encoded);
        assert_eq!(AcceptLanguage::parse(&encoded).unwrap(), al);
    }

    #[test]
    fn accept_ranges_units() {
        let values = [HeaderValue::from_static("bytes")];
        assert_eq!(AcceptRanges::parse(&values).unwrap(), AcceptRanges::Bytes);
        let values = [HeaderValue::from_static("pages")];
        assert!(AcceptRanges::parse(&values).is_err());
    }
}
