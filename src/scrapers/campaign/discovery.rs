//! Subcategory discovery helpers.

/// Reads subcategory labels out of the filter panel. Prefers the stable data
/// attribute, falls back to visible text.
pub const DISCOVERY_JS: &str = r#"
    (() => {
        const labels = [];
        for (const el of document.querySelectorAll('[data-filter-group="subcategory"] [data-filter-value]')) {
            labels.push(el.getAttribute('data-filter-value'));
        }
        if (labels.length === 0) {
            for (const el of document.querySelectorAll('.filter-panel li, .filter-panel label, [class*="FilterOption"]')) {
                labels.push(el.textContent.trim());
            }
        }
        return labels;
    })()
"#;

/// Generic navigation wording that shows up inside filter panels but is not
/// a subcategory.
const NOISE_WORDS: &[&str] = &[
    "show more",
    "show less",
    "load more",
    "clear",
    "clear all",
    "any department",
    "all",
    "see all",
];

/// Drop obvious non-subcategory noise from discovered labels.
///
/// Pure numbers are facet counts, very short strings are icons or
/// separators, and the navigation words never name a real subcategory.
pub fn filter_subcategory_noise(labels: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| l.len() >= 3)
        .filter(|l| !l.chars().all(|c| c.is_ascii_digit()))
        .filter(|l| !NOISE_WORDS.contains(&l.to_lowercase().as_str()))
        .filter(|l| seen.insert(l.to_lowercase()))
        .collect()
}

/// Detect the automation backend's "page context was torn down" fault, a
/// known transient failure of long browser sessions.
pub fn is_detached_context_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context was destroyed")
        || lower.contains("execution context")
        || lower.contains("cannot find context")
        || lower.contains("session closed")
        || lower.contains("target closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_numbers_short_strings_and_nav_words() {
        let got = filter_subcategory_noise(labels(&[
            "Dairy", "42", "ok", "Show More", "Clear", "Frozen Foods", "any department",
        ]));
        assert_eq!(got, vec!["Dairy", "Frozen Foods"]);
    }

    #[test]
    fn deduplicates_case_insensitively() {
        let got = filter_subcategory_noise(labels(&["Dairy", "dairy", "DAIRY"]));
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn trims_whitespace_before_filtering() {
        let got = filter_subcategory_noise(labels(&["  Dairy  ", "  12  "]));
        assert_eq!(got, vec!["Dairy"]);
    }

    #[test]
    fn detached_context_detection() {
        assert!(is_detached_context_error("Execution context was destroyed"));
        assert!(is_detached_context_error("Cannot find context with specified id"));
        assert!(!is_detached_context_error("selector not found"));
    }
}
