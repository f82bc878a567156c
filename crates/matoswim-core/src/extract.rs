//! Water temperature extraction from the beach webcam page.
//!
//! The page lists weather facts as `<li>` items. The sea temperature item
//! carries the label `Temp. do mar` followed by a child element holding the
//! value as digits in tenths of a degree and an ordinal-style degree sign:
//!
//! ```text
//! <li><span>Temp. do mar</span><p>185º</p></li>   =>  18.5
//! ```
//!
//! Extraction first looks at every `<li>` whose text contains the label, in
//! document order. When no list item yields a value the raw text of the
//! whole page is scanned instead, so fragments that are not well-formed HTML
//! still work.

use std::borrow::Cow;

use scraper::{Html, Selector};
use tracing::debug;

use crate::error::ExtractionError;

/// Localized label that precedes the sea temperature.
pub const SEA_TEMPERATURE_LABEL: &str = "Temp. do mar";

/// Characters accepted as the terminating degree sign.
///
/// The page uses the masculine ordinal indicator (`º`); the real degree sign
/// (`°`) is accepted as well.
pub const DEGREE_SIGNS: [char; 2] = ['º', '°'];

/// Extract the sea temperature in degrees Celsius from page text.
///
/// # Errors
///
/// - [`ExtractionError::MarkerNotFound`] if the label is absent.
/// - [`ExtractionError::MissingDegreeSign`] if no degree sign follows it.
/// - [`ExtractionError::EmptyDigits`] if no digits precede the degree sign.
/// - [`ExtractionError::NonFinite`] if the digits overflow to infinity.
///
/// # Example
///
/// ```
/// use matoswim_core::extract_temperature;
///
/// let page = "<ul><li>Temp. do mar<p>185º</p></li></ul>";
/// assert_eq!(extract_temperature(page), Ok(18.5));
/// ```
pub fn extract_temperature(page: &str) -> Result<f64, ExtractionError> {
    if !page.contains(SEA_TEMPERATURE_LABEL) {
        return Err(ExtractionError::MarkerNotFound);
    }

    for item in labelled_list_items(page) {
        match parse_after_label(&item) {
            Ok(value) => return Ok(value),
            Err(e) => debug!("List item with sea temperature label rejected: {}", e),
        }
    }

    parse_after_label(&decode_degree_entities(page))
}

/// Character references the page may use for the degree sign.
const DEGREE_ENTITIES: [(&str, char); 6] = [
    ("&ordm;", 'º'),
    ("&#186;", 'º'),
    ("&#xBA;", 'º'),
    ("&deg;", '°'),
    ("&#176;", '°'),
    ("&#xB0;", '°'),
];

/// Replace degree-sign character references with the characters themselves.
///
/// The list item path gets this from the HTML parser; the raw-text scan
/// needs it done by hand.
fn decode_degree_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut decoded = text.to_string();
    for (entity, sign) in DEGREE_ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, sign.encode_utf8(&mut [0; 4]));
        }
    }
    Cow::Owned(decoded)
}

/// Text content of every `<li>` that contains the label.
fn labelled_list_items(page: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("li") else {
        return Vec::new();
    };
    let document = Html::parse_document(page);

    document
        .select(&selector)
        .map(|li| li.text().collect::<String>())
        .filter(|text| text.contains(SEA_TEMPERATURE_LABEL))
        .collect()
}

/// Parse the digits between the label and the next degree sign.
///
/// Markup tags inside the span are dropped, then every remaining non-digit
/// character is stripped. The span never extends past the end of the
/// enclosing list item.
fn parse_after_label(text: &str) -> Result<f64, ExtractionError> {
    let start = text
        .find(SEA_TEMPERATURE_LABEL)
        .ok_or(ExtractionError::MarkerNotFound)?
        + SEA_TEMPERATURE_LABEL.len();

    let rest = &text[start..];
    let scope = rest.split("</li>").next().unwrap_or(rest);

    let end = scope
        .find(|c: char| DEGREE_SIGNS.contains(&c))
        .ok_or(ExtractionError::MissingDegreeSign)?;

    let digits: String = strip_tags(&scope[..end])
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if digits.is_empty() {
        return Err(ExtractionError::EmptyDigits);
    }

    let tenths: f64 = digits
        .parse()
        .map_err(|_| ExtractionError::NonFinite(digits.clone()))?;
    let value = tenths / 10.0;

    if !value.is_finite() {
        return Err(ExtractionError::NonFinite(digits));
    }

    Ok(value)
}

/// Remove everything between `<` and `>`.
fn strip_tags(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut in_tag = false;
    for c in span.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
