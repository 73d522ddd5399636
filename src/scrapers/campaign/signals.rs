//! Content-count signals for the load-more loop.
//!
//! Any single DOM heuristic can undercount depending on layout, so the item
//! estimate is the maximum over several independent probes.

/// Independent DOM probes, each returning an integer count.
pub const CONTENT_PROBES: &[&str] = &[
    // Item marker elements
    "document.querySelectorAll('[data-item-id], .campaign-item, .promo-item').length",
    // Links into item detail pages
    "document.querySelectorAll('a[href*=\"/item/\"], a[href*=\"/product/\"]').length",
    // Card-like containers
    "document.querySelectorAll('.card, [class*=\"ItemCard\"], [class*=\"product-card\"]').length",
];

/// Scrolls the viewport to the bottom of the document.
pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Scrolls the viewport back to the top.
pub const SCROLL_TO_TOP: &str = "window.scrollTo(0, 0)";

/// Best estimate of rendered item count: the max over all probes.
pub fn best_estimate(counts: &[u64]) -> u64 {
    counts.iter().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_the_maximum_probe() {
        assert_eq!(best_estimate(&[3, 12, 7]), 12);
    }

    #[test]
    fn empty_probe_set_is_zero() {
        assert_eq!(best_estimate(&[]), 0);
    }

    #[test]
    fn single_probe_passthrough() {
        assert_eq!(best_estimate(&[5]), 5);
    }
}
