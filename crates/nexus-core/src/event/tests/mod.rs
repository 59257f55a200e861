#[cfg(test)]
mod error_tests;
#[cfg(test)]
mod pattern_tests;
#[cfg(test)]
mod types_tests;
