/// A `&'static HeaderName` for a header-name constant expression.
macro_rules! header_name {
    ($konst:expr) => {{
        static NAME: http::header::HeaderName = $konst;
        &NAME
    }};
}

macro_rules! define_inner_handler_accessors {
    () => {
        /// Gets a reference to the underlying handler.
        pub fn get_ref(&self) -> &H {
            &self.inner
        }

        /// Consumes `self`, returning the underlying handler.
        pub fn into_inner(self) -> H {
            self.inner
        }
    };
}
