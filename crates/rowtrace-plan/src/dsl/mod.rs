//! Plan description formats consumed at the compiler boundary.

pub mod yaml;

pub use yaml::parse_yaml_plan;
