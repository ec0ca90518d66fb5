//! The immutable message model.
//!
//! [`Request`] and [`Response`] are plain data: transforms return new
//! instances, nothing mutates in place. A request carries a [`Token`] — a
//! process-unique identity minted at construction that survives every
//! `with_*` copy; per-request state is keyed by it.

use std::sync::atomic::{AtomicU64, Ordering};

mod request;
mod response;

pub use self::request::{ConnectionInfo, Request, RequestBuilder};
pub use self::response::{Response, ResponseBuilder};

/// A process-unique identity for one request.
///
/// The token is created once when the request is constructed and is carried
/// unchanged through every copy; it is the key under which context
/// properties are stored, and it never outlives the request it was minted
/// for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl Token {
    pub(crate) fn mint() -> Token {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        let a = Token::mint();
        let b = Token::mint();
        assert_ne!(a, b);
    }
}
