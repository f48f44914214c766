//! The built-in reference pattern used as a base when no template is supplied.

use crate::pattern::PatternFile;
use std::sync::OnceLock;

/// A known-good, empty 3072-byte pattern file: 120 BPM, named `USER TMPL`, with the first five
/// sections enabled.
pub static DEFAULT_TEMPLATE: &[u8] = include_bytes!("../asset/template.q7p");

static PARSED: OnceLock<PatternFile> = OnceLock::new();

/// The built-in template, parsed once and shared.
pub fn default_template() -> &'static PatternFile {
    PARSED.get_or_init(|| {
        PatternFile::parse(DEFAULT_TEMPLATE).expect("built-in template is a valid pattern file")
    })
}
