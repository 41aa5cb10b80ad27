//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `livefeed` application.
//!
//! It holds the crate-wide error types and the tracing initialisation.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }
}
