//! State module for tracking crawl and download progress
//!
//! # Components
//!
//! - `VisitTracker`: per-URL visit counts with a revisit cap
//! - `LoopDetector`: per-URL sighting counts that break traversal cycles
//! - `DomainLimiter`: per-host parallelism and request spacing
//! - `DownloadState`: the lifecycle of a resumable download job
//!
//! All of these are explicit instances owned by a crawl session and shared
//! with its workers through `Arc`.

mod domain_state;
mod download_state;
mod loop_detector;
mod visit_tracker;

pub use domain_state::{DomainLimiter, DomainPermit, DomainState};
pub use download_state::DownloadState;
pub use loop_detector::LoopDetector;
pub use visit_tracker::{UrlRecord, VisitTracker};
