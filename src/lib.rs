// cmsprobe: content-management platform detection
// Exposes the detection engine, its HTTP boundary and CLI as a library

pub mod cli;
pub mod core;
pub mod document;
pub mod error;
pub mod http;
pub mod matching;
pub mod rate_limit;
pub mod sanitize;
pub mod scoring;
pub mod server;
pub mod signatures;
pub mod validation;

pub use crate::core::{CmsDetector, DetectionReport};
pub use crate::error::DetectError;
pub use crate::scoring::{detect_cms, DetectionResult};
pub use crate::validation::{normalize_domain, NormalizedDomain};
