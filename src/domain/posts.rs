//! Post text helpers shared by listings and admin output.

use time::{format_description::FormatItem, macros::format_description};

/// Number of characters kept when a post is summarised in one line.
pub const PREVIEW_CHARS: usize = 15;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
pub const DISPLAY_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// First [`PREVIEW_CHARS`] characters of `text`, split on char boundaries.
pub fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
