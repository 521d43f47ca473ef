//! Error handling foundation.
//!
//! Only the `Result` alias lives here. Each crate defines its own error
//! enums and returns them wrapped in a rootcause `Report` from its layered
//! operations; the HTTP surface inspects the report's current context.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn fails() -> Result<(), Boom> {
        Err(Boom.into())
    }

    #[test]
    fn result_carries_typed_report() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);

        let err = fails().expect_err("should fail");
        assert!(err.to_string().contains("boom"));
    }
}
