//! Progress reporting for page fetches

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const PAGE_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} pages {msg}";

/// Bar counting fetched pages, or a hidden one when progress is disabled
pub fn page_progress(pages: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template(PAGE_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    ProgressBar::with_draw_target(Some(pages), ProgressDrawTarget::stderr()).with_style(style)
}
