pub mod catalog_tests;
pub mod dependency_tests;
