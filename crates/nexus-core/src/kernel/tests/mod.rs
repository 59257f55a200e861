mod error_tests;
mod lifecycle_tests;
