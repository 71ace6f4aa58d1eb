//! Robots.txt handling module
//!
//! Optional politeness gate: when enabled, each page URL is checked against
//! its origin's robots.txt before it is fetched. Files are fetched through
//! the current crawl client and cached per origin for an hour.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsGate};
pub use parser::RobotsRules;
