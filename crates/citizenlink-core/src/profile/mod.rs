//! External profile retrieval.
//!
//! Fetches a citizen dossier page and reduces it to the one field the
//! verification flow cares about: the short bio.

mod bio;
mod fetch;

pub use bio::BioExtractor;
pub use fetch::{FetchError, HttpProfileFetcher, ProfileFetcher};

/// A fetched profile, reduced to its bio text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub handle: String,
    pub bio: String,
}

impl ExternalProfile {
    /// Parse `html` with `extractor`. `None` when the bio field is absent.
    pub fn from_html(handle: &str, html: &str, extractor: &BioExtractor) -> Option<Self> {
        extractor.extract(html).map(|bio| Self {
            handle: handle.to_string(),
            bio,
        })
    }
}
