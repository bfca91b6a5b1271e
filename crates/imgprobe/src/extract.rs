//! Heuristic extraction of vehicle entities from rendered listing HTML.
//!
//! The markup of the source site is not under our control, so this is
//! best-effort by nature: a "card" is any element whose class mentions
//! `car` or `product` (or carries `data-car`), its name is the first
//! heading-like descendant, and its images are the `img` descendants whose
//! URL does not look like site chrome (logos, icons).

use crate::candidates::dedup_preserving_order;
use crate::catalog::{slugify, EntityDescriptor};
use crate::error::ExtractionError;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

const CARD_SELECTOR: &str = r#"[class*="car"], [class*="product"], [data-car]"#;
const NAME_SELECTOR: &str = r#"h2, h3, [class*="title"], [class*="name"]"#;
const PRICE_SELECTOR: &str = r#"[class*="price"], [class*="cost"]"#;

/// Attributes consulted for an image URL, in order.
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src"];

/// One entity discovered on a page, with its image URLs as candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCard {
    /// Position of the card among all matched elements.
    pub index: usize,
    pub entity: EntityDescriptor,
    /// Absolute image URLs, de-duplicated, in document order.
    pub images: Vec<String>,
}

/// Compiled selectors plus the exclusion list.
pub struct CardExtractor {
    card: Selector,
    name: Selector,
    price: Selector,
    img: Selector,
    exclude: Vec<String>,
}

impl CardExtractor {
    pub fn new(exclude_patterns: &[String]) -> Result<Self, ExtractionError> {
        Ok(Self {
            card: parse_selector(CARD_SELECTOR)?,
            name: parse_selector(NAME_SELECTOR)?,
            price: parse_selector(PRICE_SELECTOR)?,
            img: parse_selector("img")?,
            exclude: exclude_patterns.to_vec(),
        })
    }

    /// Extract all cards with at least one usable image.
    ///
    /// Cards that fail are logged and skipped; they never abort extraction.
    pub fn extract(&self, html: &str, page_url: &str) -> Vec<ExtractedCard> {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();

        let mut cards = Vec::new();
        for (index, element) in document.select(&self.card).enumerate() {
            match self.extract_card(index, element, base.as_ref()) {
                Ok(Some(card)) => cards.push(card),
                Ok(None) => debug!(index, "card has no usable images, skipped"),
                Err(e) => warn!(index, "skipping card: {e}"),
            }
        }
        cards
    }

    fn extract_card(
        &self,
        index: usize,
        element: ElementRef<'_>,
        base: Option<&Url>,
    ) -> Result<Option<ExtractedCard>, ExtractionError> {
        let name = element
            .select(&self.name)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Car {}", index + 1));

        let mut images = Vec::new();
        for img in element.select(&self.img) {
            let Some(raw) = IMAGE_ATTRS
                .iter()
                .filter_map(|attr| img.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
            else {
                continue;
            };
            let url = resolve_url(index, raw, base)?;
            if self.exclude.iter().any(|p| url.contains(p.as_str())) {
                continue;
            }
            images.push(url);
        }
        let images = dedup_preserving_order(images);
        if images.is_empty() {
            return Ok(None);
        }

        let price = element
            .select(&self.price)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let entity = EntityDescriptor::new(slugify(&name), name).with_attr("price", price);

        Ok(Some(ExtractedCard {
            index,
            entity,
            images,
        }))
    }
}

fn parse_selector(s: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(s).map_err(|e| ExtractionError::Selector {
        selector: s.to_string(),
        reason: e.to_string(),
    })
}

/// Collapsed, trimmed text content of an element.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_url(card: usize, raw: &str, base: Option<&Url>) -> Result<String, ExtractionError> {
    let resolved = match base {
        Some(b) => b.join(raw),
        None => Url::parse(raw),
    };
    match resolved {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(u.to_string()),
        _ => Err(ExtractionError::ImageUrl {
            card,
            url: raw.to_string(),
        }),
    }
}
