//! The `Range` request header.

use http::header::HeaderValue;

use crate::headers::util::str_value;
use crate::headers::{ParseHeaderError, TypedHeader};

/// One byte-range specifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRangeSpec {
    /// `first-last`, both inclusive.
    FromTo(u64, u64),
    /// `first-`: from an offset to the end.
    From(u64),
    /// `-n`: the last `n` bytes.
    Suffix(u64),
}

impl ByteRangeSpec {
    /// Resolve against a representation of `size` bytes into inclusive
    /// `(first, last)` positions.
    ///
    /// `None` when the range is unsatisfiable for this size: a start at or
    /// past the end, or an empty suffix. Ends past the representation are
    /// clipped, per RFC 7233.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match *self {
            ByteRangeSpec::FromTo(first, last) => {
                if first >= size || last < first {
                    None
                } else {
                    Some((first, last.min(size - 1)))
                }
            }
            ByteRangeSpec::From(first) => {
                if first >= size {
                    None
                } else {
                    Some((first, size - 1))
                }
            }
            ByteRangeSpec::Suffix(n) => {
                if n == 0 {
                    None
                } else {
                    Some((size.saturating_sub(n), size - 1))
                }
            }
        }
    }

    fn parse_str(s: &str) -> Result<Self, ParseHeaderError> {
        let (first, last) = s
            .split_once('-')
            .ok_or_else(|| ParseHeaderError::new(format!("invalid range spec `{s}`")))?;
        let (first, last) = (first.trim(), last.trim());
        let number = |v: &str| -> Result<u64, ParseHeaderError> {
            v.parse()
                .map_err(|_| ParseHeaderError::new(format!("invalid byte position `{v}`")))
        };
        match (first.is_empty(), last.is_empty()) {
            (true, true) => Err(ParseHeaderError::new("empty range spec")),
            (true, false) => Ok(ByteRangeSpec::Suffix(number(last)?)),
            (false, true) => Ok(ByteRangeSpec::From(number(first)?)),
            (false, false) => {
                let (first, last) = (number(first)?, number(last)?);
                if last < first {
                    return Err(ParseHeaderError::new(format!(
                        "range end `{last}` precedes start `{first}`"
                    )));
                }
                Ok(ByteRangeSpec::FromTo(first, last))
            }
        }
    }

    fn render(&self) -> String {
        match *self {
            ByteRangeSpec::FromTo(first, last) => format!("{first}-{last}"),
            ByteRangeSpec::From(first) => format!("{first}-"),
            ByteRangeSpec::Suffix(n) => format!("-{n}"),
        }
    }
}

/// `Range`: the byte ranges a client requests, `bytes=0-4,10-`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range(pub Vec<ByteRangeSpec>);

impl Range {
    /// A single-range header `bytes=first-last`.
    pub fn bytes(first: u64, last: u64) -> Self {
        Range(vec![ByteRangeSpec::FromTo(first, last)])
    }

    /// The specifiers in request order.
    pub fn specs(&self) -> &[ByteRangeSpec] {
        &self.0
    }
}

impl TypedHeader for Range {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::RANGE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        let ranges = s
            .strip_prefix("bytes=")
            .ok_or_else(|| ParseHeaderError::new("only the bytes unit is supported"))?;
        let specs = ranges
            .split(',')
            .map(|spec| ByteRangeSpec::parse_str(spec.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if specs.is_empty() {
            return Err(ParseHeaderError::new("empty range set"));
        }
        Ok(Range(specs))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let rendered = format!(
            "bytes={}",
            self.0
                .iter()
                .map(ByteRangeSpec::render)
                .collect::<Vec<_>>()
                .join(",")
        );
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("bytes=0-")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_range() {
        let values = [HeaderValue::from_static("bytes=0-4")];
        let range = Range::parse(&values).unwrap();
        assert_eq!(range.specs(), [ByteRangeSpec::FromTo(0, 4)]);
    }

    #[test]
    fn multiple_ranges() {
        let values = [HeaderValue::from_static("bytes=0-0,2-3,14-")];
        let range = Range::parse(&values).unwrap();
        assert_eq!(
            range.specs(),
            [
                ByteRangeSpec::FromTo(0, 0),
                ByteRangeSpec::FromTo(2, 3),
                ByteRangeSpec::From(14),
            ]
        );
    }

    #[test]
    fn suffix_resolution_clips() {
        assert_eq!(ByteRangeSpec::Suffix(4).resolve(16), Some((12, 15)));
        assert_eq!(ByteRangeSpec::Suffix(100).resolve(16), Some((0, 15)));
        assert_eq!(ByteRangeSpec::Suffix(0).resolve(16), None);
    }

    #[test]
    fn start_past_end_is_unsatisfiable() {
        assert_eq!(ByteRangeSpec::From(16).resolve(16), None);
        assert_eq!(ByteRangeSpec::FromTo(20, 30).resolve(16), None);
    }

    #[test]
    fn end_clips_to_size() {
        assert_eq!(ByteRangeSpec::FromTo(10, 100).resolve(16), Some((10, 15)));
    }

    #[test]
    fn malformed_ranges_fail() {
        for raw in ["bytes=", "bytes=a-b", "bytes=5-2", "pages=1-2", "0-4"] {
            let values = [HeaderValue::from_str(raw).unwrap()];
            assert!(Range::parse(&values).is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn round_trip() {
        let range = Range(vec![
            ByteRangeSpec::FromTo(0, 0),
            ByteRangeSpec::Suffix(2),
        ]);
        let mut values = Vec::new();
        range.encode(&mut values);
        assert_eq!(values[0].to_str().unwrap(), "bytes=0-0,-2");
        assert_eq!(Range::parse(&values).unwrap(), range);
    }
}
