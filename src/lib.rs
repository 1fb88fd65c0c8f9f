pub mod blob;
pub mod config;
pub mod error;
pub mod graph;
pub mod maven;
pub mod scanner;
pub mod util;

#[cfg(test)]
mod test_util;
