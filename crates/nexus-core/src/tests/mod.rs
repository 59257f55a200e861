// Shared fixtures for unit tests across modules
pub(crate) mod common;
