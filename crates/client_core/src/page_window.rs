//! Sliding window of page numerals shown around the current page.

/// Returns the contiguous, ascending page numbers to expose as navigation
/// controls.
///
/// The window is centred on `current` and, when it would run past the first
/// or last page, slides away from that boundary so it still holds
/// `min(total, max_visible)` pages. `current` is clamped into `1..=total`.
pub fn compute_page_window(current: u32, total: u32, max_visible: u32) -> Vec<u32> {
    if total == 0 || max_visible == 0 {
        return Vec::new();
    }

    let current = current.clamp(1, total);
    let half = max_visible / 2;
    let mut start = current.saturating_sub(half).max(1);
    let end = total.min(start.saturating_add(max_visible - 1));
    if end - start + 1 < max_visible {
        start = end.saturating_sub(max_visible - 1).max(1);
    }

    (start..=end).collect()
}
