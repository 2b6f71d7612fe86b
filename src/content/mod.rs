//! Content extraction for fetched posts
//!
//! - `post`: field priority, reblog attribution and the `NewPost` record
//! - `extractor`: URL scanning with redirect unwrapping, decoding and deny-listing
//! - `html`: best-effort tag stripping

mod extractor;
mod html;
mod post;

pub use extractor::{ContentExtractor, ExtractedContent};
pub use html::strip_html;
pub use post::{attribution, raw_content, Attribution, NewPost, REBLOG_FIELDS, TEXT_FIELDS};
