//! `Cache-Control` directives.

use std::time::Duration;

use http::header::HeaderValue;

use crate::headers::util::{comma_items, is_token, join_value, split_once_trim, unquote};
use crate::headers::{ParseHeaderError, TypedHeader};

/// `Cache-Control`: caching directives for the message.
///
/// The well-known directives get dedicated fields; anything else is carried
/// in `extensions` so the header round-trips losslessly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheControl {
    no_cache: bool,
    no_store: bool,
    no_transform: bool,
    only_if_cached: bool,
    must_revalidate: bool,
    proxy_revalidate: bool,
    public: bool,
    private: bool,
    immutable: bool,
    max_age: Option<Duration>,
    s_max_age: Option<Duration>,
    max_stale: Option<Duration>,
    min_fresh: Option<Duration>,
    extensions: Vec<(String, Option<String>)>,
}

macro_rules! flag_accessors {
    ($($(#[$doc:meta])* $field:ident, $with:ident;)*) => {$(
        $(#[$doc])*
        pub fn $field(&self) -> bool {
            self.$field
        }

        #[doc = concat!("Set the `", stringify!($field), "` directive.")]
        pub fn $with(mut self) -> Self {
            self.$field = true;
            self
        }
    )*};
}

impl CacheControl {
    /// A header with no directives set.
    pub fn new() -> Self {
        CacheControl::default()
    }

    flag_accessors! {
        /// Whether `no-cache` is set.
        no_cache, with_no_cache;
        /// Whether `no-store` is set.
        no_store, with_no_store;
        /// Whether `no-transform` is set.
        no_transform, with_no_transform;
        /// Whether `only-if-cached` is set.
        only_if_cached, with_only_if_cached;
        /// Whether `must-revalidate` is set.
        must_revalidate, with_must_revalidate;
        /// Whether `proxy-revalidate` is set.
        proxy_revalidate, with_proxy_revalidate;
        /// Whether `public` is set.
        public, with_public;
        /// Whether `private` is set.
        private, with_private;
        /// Whether `immutable` is set.
        immutable, with_immutable;
    }

    /// The `max-age` directive.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Set `max-age`.
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    /// The `s-maxage` directive.
    pub fn s_max_age(&self) -> Option<Duration> {
        self.s_max_age
    }

    /// Set `s-maxage`.
    pub fn with_s_max_age(mut self, age: Duration) -> Self {
        self.s_max_age = Some(age);
        self
    }

    /// The `max-stale` directive.
    pub fn max_stale(&self) -> Option<Duration> {
        self.max_stale
    }

    /// The `min-fresh` directive.
    pub fn min_fresh(&self) -> Option<Duration> {
        self.min_fresh
    }

    /// Unrecognized directives, in order of appearance.
    pub fn extensions(&self) -> &[(String, Option<String>)] {
        &self.extensions
    }
}

fn seconds(value: &str) -> Result<Duration, ParseHeaderError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ParseHeaderError::new(format!("invalid seconds value `{value}`")))
}

impl TypedHeader for CacheControl {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CACHE_CONTROL)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty directive list"));
        }
        let mut header = CacheControl::default();
        for item in items {
            let (name, argument) = match split_once_trim(&item, '=') {
                Some((name, argument)) => (name.to_ascii_lowercase(), Some(argument)),
                None => (item.trim().to_ascii_lowercase(), None),
            };
            match (name.as_str(), argument) {
                ("no-cache", None) => header.no_cache = true,
                ("no-store", None) => header.no_store = true,
                ("no-transform", None) => header.no_transform = true,
                ("only-if-cached", None) => header.only_if_cached = true,
                ("must-revalidate", None) => header.must_revalidate = true,
                ("proxy-revalidate", None) => header.proxy_revalidate = true,
                ("public", None) => header.public = true,
                ("private", None) => header.private = true,
                ("immutable", None) => header.immutable = true,
                ("max-age", Some(v)) => header.max_age = Some(seconds(v)?),
                ("s-maxage", Some(v)) => header.s_max_age = Some(seconds(v)?),
                ("max-stale", Some(v)) => header.max_stale = Some(seconds(v)?),
                ("min-fresh", Some(v)) => header.min_fresh = Some(seconds(v)?),
                (name, argument) => {
                    if !is_token(name) {
                        return Err(ParseHeaderError::new(format!(
                            "invalid directive name `{name}`"
                        )));
                    }
                    let argument = argument.map(unquote).transpose()?;
                    header.extensions.push((name.to_owned(), argument));
                }
            }
        }
        Ok(header)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let mut directives: Vec<String> = Vec::new();
        let flags = [
            (self.public, "public"),
            (self.private, "private"),
            (self.no_cache, "no-cache"),
            (self.no_store, "no-store"),
            (self.no_transform, "no-transform"),
            (self.only_if_cached, "only-if-cached"),
            (self.must_revalidate, "must-revalidate"),
            (self.proxy_revalidate, "proxy-revalidate"),
            (self.immutable, "immutable"),
        ];
        for (set, name) in flags {
            if set {
                directives.push(name.to_owned());
            }
        }
        let ages = [
            (self.max_age, "max-age"),
            (self.s_max_age, "s-maxage"),
            (self.max_stale, "max-stale"),
            (self.min_fresh, "min-fresh"),
        ];
        for (age, name) in ages {
            if let Some(age) = age {
                directives.push(format!("{name}={}", age.as_secs()));
            }
        }
        for (name, argument) in &self.extensions {
            match argument {
                Some(argument) => directives.push(format!("{name}={argument}")),
                None => directives.push(name.clone()),
            }
        }
        values.push(join_value(directives));
    }
}
