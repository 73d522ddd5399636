//! Pure extraction functions over rendered campaign markup.
//!
//! Everything here is deterministic string/DOM work; the browser session
//! hands in a captured document and gets a [`CampaignResult`] back.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};

use crate::error::ScrapeError;
use crate::models::{CampaignResult, DiscountType};

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*%").expect("valid regex"));
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£]\s*(\d+(?:[.,]\d+)?)").expect("valid regex"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}[./]\d{1,2}[./]\d{4}|\d{4}-\d{2}-\d{2})").expect("valid regex")
});
static ITEM_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"/(?:item|product)/([A-Za-z0-9_-]+)"#).expect("valid regex")
});
static SCRIPT_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""item(?:_i|I)d"\s*:\s*"([A-Za-z0-9_-]+)""#).expect("valid regex")
});

/// Title and schedule text pulled from the campaign header.
#[derive(Debug, Clone, Default)]
pub struct CampaignHeader {
    pub title: String,
    pub schedule_text: Option<String>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Read the campaign headline and schedule line.
pub fn extract_header(html: &str) -> CampaignHeader {
    let doc = Html::parse_document(html);

    let title = [
        "[data-campaign-title]",
        ".campaign-title",
        ".promo-headline",
        "h1",
    ]
    .iter()
    .find_map(|css| {
        doc.select(&selector(css))
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    })
    .unwrap_or_default();

    let schedule_text = [".campaign-schedule", ".promo-period", "[data-schedule]"]
        .iter()
        .find_map(|css| {
            doc.select(&selector(css))
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        });

    CampaignHeader {
        title,
        schedule_text,
    }
}

/// Parse discount form and magnitude from a headline like "20% off" or
/// "$5 off all dairy".
pub fn parse_discount(headline: &str) -> (DiscountType, f64) {
    if let Some(caps) = PERCENT_RE.captures(headline) {
        let value = caps[1].replace(',', ".").parse().unwrap_or(0.0);
        return (DiscountType::Percentage, value);
    }
    if let Some(caps) = AMOUNT_RE.captures(headline) {
        let value = caps[1].replace(',', ".").parse().unwrap_or(0.0);
        return (DiscountType::Fixed, value);
    }
    (DiscountType::Percentage, 0.0)
}

fn parse_one_date(s: &str) -> Option<NaiveDate> {
    for format in ["%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

/// Parse a locale-style date range such as "01.07.2024 - 31.07.2024".
///
/// The first recognizable date is the start, the second the end; a text with
/// fewer than two dates yields partial output.
pub fn parse_date_range(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let mut dates = DATE_RE
        .find_iter(text)
        .filter_map(|m| parse_one_date(m.as_str()));
    (dates.next(), dates.next())
}

/// Union of item ids found via independent strategies: detail links, data
/// attributes, and embedded script data. Deduplicated, first-seen order.
pub fn extract_item_ids(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    let mut push = |id: String| {
        if !id.is_empty() && seen.insert(id.clone()) {
            ids.push(id);
        }
    };

    let doc = Html::parse_document(html);

    for el in doc.select(&selector("a[href]")) {
        if let Some(href) = el.value().attr("href") {
            if let Some(caps) = ITEM_LINK_RE.captures(href) {
                push(caps[1].to_string());
            }
        }
    }

    for el in doc.select(&selector("[data-item-id]")) {
        if let Some(id) = el.value().attr("data-item-id") {
            push(id.to_string());
        }
    }

    for caps in SCRIPT_ITEM_RE.captures_iter(html) {
        push(caps[1].to_string());
    }

    ids
}

/// Turn a captured document into the normalized campaign artifact.
///
/// An empty title means the page did not resolve to a real campaign.
pub fn parse_campaign(html: &str, campaign_id: &str) -> Result<CampaignResult, ScrapeError> {
    let header = extract_header(html);
    if header.title.is_empty() {
        return Err(ScrapeError::NotFound(format!(
            "campaign {campaign_id} did not render a headline"
        )));
    }

    let (discount_type, discount_value) = parse_discount(&header.title);
    let (start_date, end_date) = header
        .schedule_text
        .as_deref()
        .map(parse_date_range)
        .unwrap_or((None, None));

    let mut result = CampaignResult::new(
        campaign_id.to_string(),
        header.title,
        header.schedule_text.unwrap_or_default(),
        discount_type,
        discount_value,
    );
    result.start_date = start_date;
    result.end_date = end_date;
    result.item_ids = extract_item_ids(html);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
        <h1 class="campaign-title">20% off summer picks</h1>
        <div class="campaign-schedule">01.07.2024 - 31.07.2024</div>
        <a href="/item/A1">one</a>
        <a href="/product/B2">two</a>
        <a href="/item/A1">dup</a>
        <div data-item-id="C3"></div>
        <script>window.__DATA__ = {"items":[{"itemId":"D4"}]};</script>
        </body></html>
    "##;

    #[test]
    fn header_extraction_prefers_campaign_title() {
        let header = extract_header(PAGE);
        assert_eq!(header.title, "20% off summer picks");
        assert_eq!(header.schedule_text.as_deref(), Some("01.07.2024 - 31.07.2024"));
    }

    #[test]
    fn discount_parsing() {
        assert_eq!(parse_discount("20% off"), (DiscountType::Percentage, 20.0));
        assert_eq!(parse_discount("Save 12,5 % today"), (DiscountType::Percentage, 12.5));
        assert_eq!(parse_discount("$5 off dairy"), (DiscountType::Fixed, 5.0));
        assert_eq!(parse_discount("Great deals"), (DiscountType::Percentage, 0.0));
    }

    #[test]
    fn date_range_parsing() {
        let (start, end) = parse_date_range("01.07.2024 - 31.07.2024");
        assert_eq!(start, Some(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()));
        assert_eq!(end, Some(NaiveDate::from_ymd_opt(2024, 7, 31).unwrap()));

        let (start, end) = parse_date_range("from 2024-07-01");
        assert!(start.is_some());
        assert!(end.is_none());

        assert_eq!(parse_date_range("no dates here"), (None, None));
    }

    #[test]
    fn item_ids_unioned_and_deduplicated() {
        let ids = extract_item_ids(PAGE);
        assert_eq!(ids, vec!["A1", "B2", "C3", "D4"]);
    }

    #[test]
    fn parse_campaign_happy_path() {
        let result = parse_campaign(PAGE, "summer24").unwrap();
        assert_eq!(result.id, "summer24");
        assert_eq!(result.discount_type, DiscountType::Percentage);
        assert_eq!(result.discount_value, 20.0);
        assert!(result.start_date.is_some());
        assert_eq!(result.item_ids.len(), 4);
    }

    #[test]
    fn missing_headline_is_not_found() {
        let err = parse_campaign("<html><body></body></html>", "x1").unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
    }
}
