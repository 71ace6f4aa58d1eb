//! Crawler module for page discovery and processing
//!
//! This module contains the crawl path, including:
//! - HTTP page fetching and response classification
//! - HTML parsing, link extraction and readable-text extraction
//! - The breadth-first frontier
//! - Session orchestration across workers, downloads and rotation

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{CrawlOrchestrator, SessionStats};
pub use fetcher::{
    classify_response, fetch_page, is_binary_content_type, FetchError, FetchedPage, ResponseKind,
};
pub use parser::{
    extract_links, parse_html, ContentExtractor, ExtractedContent, HtmlTextExtractor, ParsedPage,
};
pub use scheduler::{CrawlTask, Frontier};
