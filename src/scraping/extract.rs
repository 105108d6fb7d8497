//! Detail-page HTML → domain values.

use crate::core::types::{DocField, DocumentFieldSet, Record};
use crate::core::{PortalError, PortalResult};
use crate::scraping::portal::{
    Locator, DETAIL_DISTRICT, DETAIL_GENERATED_ON, DETAIL_ISTP, DETAIL_OSTP, DETAIL_QTY,
    DETAIL_VALID_UPTO,
};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

static WHITESPACE: OnceLock<Regex> = OnceLock::new();

/// Non-breaking spaces become spaces, whitespace runs collapse, ends are trimmed.
pub fn normalize_text(raw: &str) -> String {
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    re.replace_all(&raw.replace('\u{a0}', " "), " ")
        .trim()
        .to_string()
}

/// Normalised text of the first element matching `css`, `None` if absent.
pub fn text_of(doc: &Html, css: &str) -> PortalResult<Option<String>> {
    let selector =
        Selector::parse(css).map_err(|e| PortalError::Browser(format!("bad selector {css}: {e}")))?;
    Ok(doc
        .select(&selector)
        .next()
        .map(|el| normalize_text(&el.text().collect::<String>())))
}

/// Static HTML can only be searched by CSS; link-text locators need the live
/// page's text matching.
fn css(locator: Locator) -> PortalResult<&'static str> {
    match locator {
        Locator::Css(s) => Ok(s),
        Locator::LinkText(_) => Err(PortalError::Browser(format!(
            "{locator} cannot be resolved against static HTML"
        ))),
    }
}

/// Build a [`Record`] from a loaded detail page.
///
/// The destination district label is mandatory; a page without it is not a
/// record page (unknown id, error page) and yields `PerUnit`.
pub fn record_from_html(id: u64, html: &str) -> PortalResult<Record> {
    let doc = Html::parse_document(html);
    let field = |locator: Locator| -> PortalResult<String> {
        Ok(text_of(&doc, css(locator)?)?.unwrap_or_default())
    };

    let destination_district = text_of(&doc, css(DETAIL_DISTRICT)?)?
        .ok_or_else(|| PortalError::PerUnit(format!("[{id}] destination district label missing")))?;

    Ok(Record {
        id,
        istp: field(DETAIL_ISTP)?,
        ostp: field(DETAIL_OSTP)?,
        destination_district,
        qty: field(DETAIL_QTY)?,
        valid_upto: field(DETAIL_VALID_UPTO)?,
        generated_on: field(DETAIL_GENERATED_ON)?,
        unused: None,
    })
}

/// Extract every [`DocField`] present on the page.
pub fn fields_from_html(html: &str) -> PortalResult<DocumentFieldSet> {
    let doc = Html::parse_document(html);
    let mut fields = DocumentFieldSet::new();
    for field in DocField::ALL {
        if let Some(value) = text_of(&doc, field.selector())? {
            fields.set(field, value);
        }
    }
    Ok(fields)
}

/// Whether the identifier label on a page refers to `requested`.
///
/// The label may carry decoration around the number, so any whole
/// alphanumeric token equal to the requested identifier counts; a mere
/// substring (`100` inside `1001`) does not.
pub fn identifier_matches(displayed: &str, requested: &str) -> bool {
    let requested = requested.trim();
    if requested.is_empty() {
        return false;
    }
    let displayed = normalize_text(displayed);
    displayed == requested
        || displayed
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == requested)
}
