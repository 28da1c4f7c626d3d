//! Plain-text rendering of controller output for the terminal.

use client_core::{AffordanceVisibility, PaginationView, SearchStats};
use shared::protocol::Book;

pub fn render_stats(stats: &SearchStats) -> String {
    format!(
        "{} results in {}s | most common author: {} | published {} to {}",
        stats.total_results,
        stats.elapsed_display(),
        stats.most_common_author,
        stats.earliest_pub_date,
        stats.latest_pub_date
    )
}

pub fn render_results(page: u32, books: &[Book]) -> String {
    if books.is_empty() {
        return format!("-- page {page}: no results --");
    }
    let mut out = format!("-- page {page} --");
    for (position, book) in books.iter().enumerate() {
        out.push_str(&format!("\n{:>2}. {} by {}", position + 1, book.title, book.authors));
        if let Some(date) = &book.published_date {
            out.push_str(&format!(" ({date})"));
        }
    }
    out
}

pub fn render_description(position: usize, book: &Book) -> String {
    format!("{position}. {}\n    {}", book.title, book.description_or_default())
}

fn control(label: &str, disabled: bool) -> String {
    if disabled {
        format!("({label})")
    } else {
        label.to_string()
    }
}

/// One line of pagination controls. Disabled controls are parenthesised and
/// the first/last controls appear only while their flag allows them.
pub fn render_pagination(view: &PaginationView, visibility: AffordanceVisibility) -> String {
    let mut parts = Vec::new();
    if visibility.first_page {
        parts.push(control("<< first", view.prev_disabled));
    }
    parts.push(control("< prev", view.prev_disabled));
    for page in &view.pages {
        if *page == view.current_page {
            parts.push(format!("[{page}]"));
        } else {
            parts.push(page.to_string());
        }
    }
    parts.push(control("next >", view.next_disabled));
    if visibility.last_page {
        parts.push(control("last >>", view.next_disabled));
    }
    format!("{} | page {} of {}", parts.join(" "), view.current_page, view.total_pages)
}
