//! Selector-driven HTML extractor
//!
//! Fetches the item page built from the `url-template` and reads every
//! configured field with a CSS selector.
//!
//! # Field Rules
//!
//! - text of the first match by default, or the named attribute
//! - `multiple = true` collects every match, one value per line
//! - whitespace is collapsed and trimmed
//! - nothing matched (or only empty values) yields the placeholder
//!
//! The id is percent-encoded into the template, and the resolved page URL is
//! always stored under `item_url`.

use crate::config::{FieldRule, SourceConfig};
use crate::extractor::{ExtractionError, Extractor};
use crate::session::HttpSession;
use crate::state::{ExtractionOutcome, FieldMap, WorkItem};
use crate::ConfigError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Instant;
use url::Url;

/// Field name holding the fetched page URL
pub const ITEM_URL_FIELD: &str = "item_url";

struct CompiledRule {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    multiple: bool,
}

impl CompiledRule {
    fn compile(rule: &FieldRule) -> Result<Self, ConfigError> {
        let selector = Selector::parse(&rule.selector).map_err(|e| ConfigError::InvalidSelector {
            field: rule.name.clone(),
            message: format!("{:?}", e),
        })?;

        Ok(Self {
            name: rule.name.clone(),
            selector,
            attribute: rule.attribute.clone(),
            multiple: rule.multiple,
        })
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.attribute {
            Some(attr) => element.value().attr(attr)?.to_string(),
            None => element.text().collect::<Vec<_>>().join(" "),
        };
        let value = collapse_whitespace(&raw);
        (!value.is_empty()).then_some(value)
    }

    fn extract(&self, document: &Html) -> Option<String> {
        let mut matches = document
            .select(&self.selector)
            .filter_map(|element| self.read(element));

        if self.multiple {
            let values: Vec<String> = matches.collect();
            (!values.is_empty()).then(|| values.join("\n"))
        } else {
            matches.next()
        }
    }
}

/// Extractor for HTML item pages
pub struct HtmlExtractor {
    url_template: String,
    placeholder: String,
    rules: Vec<CompiledRule>,
}

impl HtmlExtractor {
    pub fn new(source: &SourceConfig) -> Result<Self, ConfigError> {
        let rules = source
            .fields
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            url_template: source.url_template.clone(),
            placeholder: source.placeholder.clone(),
            rules,
        })
    }

    /// Page URL for an item, with the id percent-encoded
    pub fn item_url(&self, item: &WorkItem) -> Result<Url, ExtractionError> {
        let raw = self
            .url_template
            .replace("{id}", &urlencoding::encode(&item.id));
        Url::parse(&raw).map_err(|e| ExtractionError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    /// Reads every configured field from a page body
    pub fn extract_fields(&self, body: &str) -> FieldMap {
        let document = Html::parse_document(body);

        self.rules
            .iter()
            .map(|rule| {
                let value = rule
                    .extract(&document)
                    .unwrap_or_else(|| self.placeholder.clone());
                (rule.name.clone(), value)
            })
            .collect()
    }
}

#[async_trait]
impl Extractor<HttpSession> for HtmlExtractor {
    async fn extract(
        &self,
        session: &mut HttpSession,
        item: &WorkItem,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let started = Instant::now();
        let url = self.item_url(item)?;
        let client = session.client().ok_or(ExtractionError::SessionClosed)?;

        tracing::debug!("Fetching {} from {}", item, url);
        let response = client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(ExtractionOutcome::failure(
                format!("HTTP {}", status.as_u16()),
                elapsed_millis(started),
            ));
        }

        let body = response.text().await?;
        let mut fields = self.extract_fields(&body);
        fields.insert(ITEM_URL_FIELD.to_string(), url.to_string());

        Ok(ExtractionOutcome::success(fields, elapsed_millis(started)))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
