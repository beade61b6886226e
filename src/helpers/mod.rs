//! Formatting helpers shared by pages, templates and the newsletter
//!
//! Pure functions that normalize timestamps, text and links for display.

mod date;
mod html;
mod url;

pub use date::*;
pub use html::*;
pub use url::*;
