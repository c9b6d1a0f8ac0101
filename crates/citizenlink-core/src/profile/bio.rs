//! Bio field extraction from a citizen dossier page.

use scraper::{Html, Selector};

use crate::error::{Error, Result};

/// Pulls the bio text out of a profile page using a CSS selector.
#[derive(Debug, Clone)]
pub struct BioExtractor {
    selector: Selector,
}

impl BioExtractor {
    pub fn new(selector: &str) -> Result<Self> {
        let selector = Selector::parse(selector)
            .map_err(|e| Error::Config(format!("invalid bio selector '{selector}': {e}")))?;
        Ok(Self { selector })
    }

    /// Text of the first matching element, trimmed.
    ///
    /// `None` when the page has no bio element, which is what a private
    /// dossier looks like.
    pub fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
    }
}
