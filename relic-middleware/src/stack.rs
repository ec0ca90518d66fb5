use super::Middleware;
use std::fmt;

/// Two middlewares chained together.
///
/// `Stack<Inner, Outer>` first applies `inner`, then hands the result to
/// `outer`; the outer middleware therefore observes requests first. Pipeline
/// builders nest stacks so that the order of `add` calls is the order of
/// observation.
#[derive(Clone)]
pub struct Stack<Inner, Outer> {
    inner: Inner,
    outer: Outer,
}

impl<Inner, Outer> Stack<Inner, Outer> {
    /// Create a new [`Stack`].
    pub fn new(inner: Inner, outer: Outer) -> Self {
        Stack { inner, outer }
    }
}

impl<H, Inner, Outer> Middleware<H> for Stack<Inner, Outer>
where
    Inner: Middleware<H>,
    Outer: Middleware<Inner::Handler>,
{
    type Handler = Outer::Handler;

    fn wrap(&self, handler: H) -> Self::Handler {
        let inner = self.inner.wrap(handler);
        self.outer.wrap(inner)
    }
}

impl<Inner, Outer> fmt::Debug for Stack<Inner, Outer>
where
    Inner: fmt::Debug,
    Outer: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pipelines can get deeply nested, render as a flat list
        write!(f, "{:?}, {:?}", self.outer, self.inner)
    }
}
