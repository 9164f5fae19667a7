use scraper::{ElementRef, Selector};

use crate::error::{LinesError, Result};

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| LinesError::Config(format!("invalid selector '{}': {:?}", css, e)))
}

/// Text content with every text node separated by one space and runs of
/// whitespace collapsed. Multi-line cells ("Away (3-1)<br>Home (2-2)")
/// stay separable this way.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised header label: trimmed, lower-cased, spaces as underscores
pub fn header_key(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}
