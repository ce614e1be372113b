use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use url::Url;

const MAX_NAME_LEN: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no selector yielded a valid price")]
    NoPriceFound,

    #[error("malformed content: {0}")]
    MalformedContent(String),
}

/// Ordered selector fallback lists for one page layout. Selectors are tried
/// in order and the first one yielding a valid value wins, per field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorRules {
    pub name_selectors: Vec<String>,
    pub price_selectors: Vec<String>,
}

impl SelectorRules {
    pub fn new(name_selectors: Vec<&str>, price_selectors: Vec<&str>) -> Self {
        Self {
            name_selectors: name_selectors.into_iter().map(String::from).collect(),
            price_selectors: price_selectors.into_iter().map(String::from).collect(),
        }
    }
}

/// Fields recovered from a product page. A missing name is tolerated; the
/// monitor falls back to the configured product name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub name: Option<String>,
    pub price: Decimal,
}

/// Built-in selector rules for known storefronts plus a generic fallback.
#[derive(Debug, Clone)]
pub struct SelectorLibrary {
    sites: HashMap<String, SelectorRules>,
    generic: SelectorRules,
}

impl Default for SelectorLibrary {
    fn default() -> Self {
        let mut sites = HashMap::new();
        sites.insert(
            "amazon.com".to_string(),
            SelectorRules::new(
                vec!["#productTitle", ".product-title", "h1.a-size-large"],
                vec![
                    ".a-price-whole",
                    ".a-price .a-offscreen",
                    "#priceblock_dealprice",
                    "#priceblock_ourprice",
                ],
            ),
        );
        sites.insert(
            "mercadolivre.com.br".to_string(),
            SelectorRules::new(
                vec![".ui-pdp-title", ".item-title", "h1.ui-pdp-title"],
                vec![
                    ".andes-money-amount__fraction",
                    ".price-tag-fraction",
                    ".price-tag-amount",
                    ".ui-pdp-price__fraction",
                ],
            ),
        );
        sites.insert(
            "americanas.com.br".to_string(),
            SelectorRules::new(
                vec![".product-title", "h1.product-title", ".pdp-product-name"],
                vec![".price-value", ".sales-price", ".best-price"],
            ),
        );
        sites.insert(
            "magazineluiza.com.br".to_string(),
            SelectorRules::new(
                vec![
                    ".header-product__title",
                    "h1[data-testid=\"heading-product-title\"]",
                    ".product-title",
                ],
                vec![
                    ".price-value",
                    ".price-template__text",
                    "[data-testid=\"price-value\"]",
                ],
            ),
        );
        sites.insert(
            "casasbahia.com.br".to_string(),
            SelectorRules::new(
                vec![".product-title", "h1.product-title"],
                vec![".price-value", ".sales-price", ".best-price"],
            ),
        );

        let generic = SelectorRules::new(
            vec![
                "h1",
                ".product-title",
                ".product-name",
                ".item-title",
                "[class*=\"title\"]",
            ],
            vec![
                "[class*=\"price\"]",
                "[id*=\"price\"]",
                "[data-testid*=\"price\"]",
                ".price",
                "#price",
                ".valor",
                ".preco",
            ],
        );

        Self { sites, generic }
    }
}

impl SelectorLibrary {
    /// Resolve the rules for a URL: per-product override, then exact domain
    /// match, then partial (subdomain) match, then the generic fallback.
    pub fn rules_for<'a>(
        &'a self,
        url: &str,
        custom: Option<&'a SelectorRules>,
    ) -> &'a SelectorRules {
        if let Some(rules) = custom {
            return rules;
        }

        let domain = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();

        if let Some(rules) = self.sites.get(&domain) {
            debug!(domain, "using site-specific selectors");
            return rules;
        }

        for (site_domain, rules) in &self.sites {
            if domain.ends_with(site_domain.as_str()) {
                debug!(domain, matched = site_domain, "using partial match selectors");
                return rules;
            }
        }

        debug!(domain, "using generic selectors");
        &self.generic
    }
}

/// Tolerant HTML extractor. Pure over its inputs: identical content and
/// rules always produce identical output.
pub struct Extractor {
    library: SelectorLibrary,
    price_patterns: Vec<Regex>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        // Tried in order: explicit R$ amounts, Brazilian decimal-comma
        // amounts, plain dot-decimal amounts, bare integers.
        let price_patterns = [
            r"R\$\s*(\d{1,3}(?:\.\d{3})*(?:,\d{2})?)",
            r"(\d{1,3}(?:\.\d{3})*,\d{2})",
            r"(\d+\.?\d*)",
            r"(\d+(?:,\d{2})?)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static price pattern"))
        .collect();

        Self {
            library: SelectorLibrary::default(),
            price_patterns,
        }
    }

    pub fn rules_for<'a>(
        &'a self,
        url: &str,
        custom: Option<&'a SelectorRules>,
    ) -> &'a SelectorRules {
        self.library.rules_for(url, custom)
    }

    /// Apply ordered selector fallback to raw page content. A missing name
    /// is not fatal; a missing price is.
    pub fn extract(
        &self,
        content: &str,
        rules: &SelectorRules,
    ) -> Result<ProductFields, ExtractError> {
        if content.trim().is_empty() {
            return Err(ExtractError::MalformedContent(
                "empty page content".to_string(),
            ));
        }

        let document = Html::parse_document(content);

        let price = self
            .first_price(&document, &rules.price_selectors)
            .ok_or(ExtractError::NoPriceFound)?;
        let name = self.first_name(&document, &rules.name_selectors);

        Ok(ProductFields { name, price })
    }

    fn first_price(&self, document: &Html, selectors: &[String]) -> Option<Decimal> {
        for raw in selectors {
            let Ok(selector) = Selector::parse(raw) else {
                debug!(selector = raw.as_str(), "skipping invalid price selector");
                continue;
            };
            for element in document.select(&selector) {
                let text = element_text(&element);
                if text.is_empty() {
                    continue;
                }
                if let Some(price) = self.normalize_price(&text) {
                    debug!(selector = raw.as_str(), %price, "price extracted");
                    return Some(price);
                }
            }
        }
        None
    }

    fn first_name(&self, document: &Html, selectors: &[String]) -> Option<String> {
        for raw in selectors {
            let Ok(selector) = Selector::parse(raw) else {
                debug!(selector = raw.as_str(), "skipping invalid name selector");
                continue;
            };
            for element in document.select(&selector) {
                let text = element_text(&element);
                if !text.is_empty() {
                    return Some(truncate_name(&text));
                }
            }
        }
        None
    }

    /// Normalize a price string to a non-negative decimal. Handles currency
    /// prefixes, thousands separators and both comma- and dot-decimal
    /// conventions.
    pub fn normalize_price(&self, text: &str) -> Option<Decimal> {
        for pattern in &self.price_patterns {
            let Some(captures) = pattern.captures(text) else {
                continue;
            };
            let mut raw = captures.get(1)?.as_str().to_string();

            if raw.contains(',') && raw.contains('.') {
                // Brazilian 1.234,56: drop thousands dots, comma is decimal.
                raw = raw.replace('.', "").replace(',', ".");
            } else if raw.matches(',').count() == 1 {
                raw = raw.replace(',', ".");
            }

            match Decimal::from_str(&raw) {
                Ok(price) if price >= Decimal::ZERO => return Some(price),
                _ => continue,
            }
        }
        None
    }
}

fn element_text(element: &scraper::ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_LEN {
        let prefix: String = name.chars().take(MAX_NAME_LEN).collect();
        format!("{prefix}...")
    } else {
        name.to_string()
    }
}
