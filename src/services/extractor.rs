use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{clean_title, normalize_attribute_key, ProductSignals};

use super::PageFetcher;

const MAX_TABLES: usize = 6;
const MAX_TABLE_ROWS: usize = 30;
const MAX_DEFINITION_LISTS: usize = 6;
const MAX_LIST_ITEMS: usize = 30;
const MAX_LIST_ITEM_LEN: usize = 200;
const VISIBLE_TEXT_SCAN_LEN: usize = 2000;

const DESCRIPTION_SELECTORS: &str =
    "#description, .product-description, .product__description, .productDesc, .pdp-description";

static GTIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:gtin|ean|upc)[\s#:]*([0-9]{8,14})\b").unwrap());
static MPN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bmpn[\s#:]*([\w\-.]{3,})\b").unwrap());
static SKU_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsku[\s#:]*([\w\-.]{3,})\b").unwrap());
static MODEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z0-9]+[-/][A-Z0-9\-]{2,})\b").unwrap());
static SPEC_SECTION_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)spec|feature").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Brand in JSON-LD shows up either as a plain string or as an object
/// with a `name`. Normalized to a string at the extraction boundary.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BrandRef {
    Name(String),
    Object { name: Option<String> },
}

impl BrandRef {
    fn into_name(self) -> Option<String> {
        let name = match self {
            BrandRef::Name(name) => name,
            BrandRef::Object { name } => name?,
        };
        let name = name.trim().to_string();
        (!name.is_empty()).then_some(name)
    }
}

/// Fetches a page and extracts its product signals. Never fails: an
/// unreachable page degrades to a record with empty fields.
pub async fn extract_product_signals(fetcher: &PageFetcher, url: &str) -> ProductSignals {
    let html = fetcher.fetch(url).await.unwrap_or_default();
    parse_signals(url, &html)
}

/// Pure extraction stage (html text in, signal record out) so heuristics
/// can be tested against literal fixtures without network access.
///
/// Stages run in priority order and each one only fills fields that are
/// still unset, so structured markup always wins over mined boilerplate.
pub fn parse_signals(url: &str, html: &str) -> ProductSignals {
    let document = Html::parse_document(html);
    let json_ld = product_json_ld(&document);

    // Title fallback chain: JSON-LD name, <title>, og:title, first <h1>.
    let raw_title = json_ld
        .as_ref()
        .and_then(|ld| string_field(ld, "name"))
        .or_else(|| {
            let selector = Selector::parse("title").unwrap();
            document
                .select(&selector)
                .next()
                .map(|el| element_text(&el))
                .filter(|text| !text.is_empty())
        })
        .or_else(|| meta_content(&document, "og:title"))
        .or_else(|| {
            let selector = Selector::parse("h1").unwrap();
            document
                .select(&selector)
                .next()
                .map(|el| element_text(&el))
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_default();
    let title = clean_title(&raw_title);

    let brand = json_ld.as_ref().and_then(|ld| {
        ld.get("brand")
            .cloned()
            .and_then(|value| serde_json::from_value::<BrandRef>(value).ok())
            .and_then(BrandRef::into_name)
    });

    let description = json_ld
        .as_ref()
        .and_then(|ld| string_field(ld, "description"))
        .or_else(|| meta_content(&document, "og:description"))
        .or_else(|| meta_content(&document, "description"))
        .or_else(|| {
            let selector = Selector::parse(DESCRIPTION_SELECTORS).unwrap();
            document
                .select(&selector)
                .next()
                .map(|el| element_text(&el))
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_default();

    let visible_text: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(VISIBLE_TEXT_SCAN_LEN)
        .collect();
    let scan_blob = format!("{} {} {}", title, description, visible_text);
    let mut identifiers = extract_identifiers(&scan_blob);

    if !identifiers.contains_key("model") {
        if let Some(caps) = MODEL_RE.captures(&title) {
            identifiers.insert("model".to_string(), caps[1].to_string());
        }
    }

    let mut attributes = BTreeMap::new();
    if let Some(ld) = &json_ld {
        collect_json_ld_attributes(ld, &mut attributes);
    }
    collect_table_attributes(&document, &mut attributes);
    collect_definition_list_attributes(&document, &mut attributes);
    collect_spec_list_attributes(&document, &mut attributes);

    ProductSignals {
        url: url.to_string(),
        title,
        brand,
        description,
        identifiers,
        attributes,
        schema_present: json_ld.is_some(),
    }
}

/// Label-anchored identifier scans over free text. At most one value per
/// kind, first match wins.
pub fn extract_identifiers(text: &str) -> BTreeMap<String, String> {
    let mut identifiers = BTreeMap::new();
    if text.trim().is_empty() {
        return identifiers;
    }
    for (kind, pattern) in [("gtin", &GTIN_RE), ("mpn", &MPN_RE), ("sku", &SKU_RE)] {
        if let Some(caps) = pattern.captures(text) {
            identifiers.insert(kind.to_string(), caps[1].to_string());
        }
    }
    identifiers
}

/// First JSON-LD block whose declared type is "Product" (case-insensitive;
/// a list-valued type counts through its first string entry).
fn product_json_ld(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let items = match parsed {
            Value::Array(items) => items,
            other => vec![other],
        };
        for item in items {
            if !item.is_object() {
                continue;
            }
            let declared = item.get("@type").or_else(|| item.get("type"));
            let type_name = match declared {
                Some(Value::String(name)) => Some(name.clone()),
                Some(Value::Array(entries)) => entries
                    .iter()
                    .find_map(|entry| entry.as_str().map(str::to_string)),
                _ => None,
            };
            if type_name.is_some_and(|name| name.eq_ignore_ascii_case("product")) {
                return Some(item);
            }
        }
    }
    None
}

fn collect_json_ld_attributes(ld: &Value, attributes: &mut BTreeMap<String, String>) {
    for key in ["color", "size", "material", "pattern"] {
        if let Some(value) = string_field(ld, key) {
            ingest_pair(attributes, key, &value);
        }
    }

    let Some(properties) = ld.get("additionalProperty").and_then(Value::as_array) else {
        return;
    };
    for property in properties {
        let name = property.get("name").map(scalar_text).unwrap_or_default();
        let value = property.get("value").map(scalar_text).unwrap_or_default();
        ingest_pair(attributes, &name, &value);
    }
}

/// Header cell paired with the last data cell of each row, over the first
/// few tables on the page.
fn collect_table_attributes(document: &Html, attributes: &mut BTreeMap<String, String>) {
    let table_selector = Selector::parse("table").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let header_selector = Selector::parse("th").unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    for table in document.select(&table_selector).take(MAX_TABLES) {
        for row in table.select(&row_selector).take(MAX_TABLE_ROWS) {
            let header = row.select(&header_selector).next();
            let last_cell = row.select(&cell_selector).last();
            if let (Some(header), Some(cell)) = (header, last_cell) {
                ingest_pair(attributes, &element_text(&header), &element_text(&cell));
            }
        }
    }
}

fn collect_definition_list_attributes(document: &Html, attributes: &mut BTreeMap<String, String>) {
    let list_selector = Selector::parse("dl").unwrap();
    let term_selector = Selector::parse("dt").unwrap();
    let definition_selector = Selector::parse("dd").unwrap();

    for list in document.select(&list_selector).take(MAX_DEFINITION_LISTS) {
        let terms = list.select(&term_selector);
        let definitions = list.select(&definition_selector);
        for (term, definition) in terms.zip(definitions) {
            ingest_pair(attributes, &element_text(&term), &element_text(&definition));
        }
    }
}

/// "key: value" bullet items under elements whose id or class hints at a
/// spec or feature section.
fn collect_spec_list_attributes(document: &Html, attributes: &mut BTreeMap<String, String>) {
    let item_selector = Selector::parse("li").unwrap();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let hinted = element
            .value()
            .attr("id")
            .is_some_and(|id| SPEC_SECTION_HINT.is_match(id))
            || element
                .value()
                .attr("class")
                .is_some_and(|class| SPEC_SECTION_HINT.is_match(class));
        if !hinted {
            continue;
        }

        for item in element.select(&item_selector).take(MAX_LIST_ITEMS) {
            let text = element_text(&item);
            if text.len() >= MAX_LIST_ITEM_LEN {
                continue;
            }
            if let Some((key, value)) = text.split_once(':') {
                ingest_pair(attributes, key, value);
            }
        }
    }
}

/// Normalizes the key and inserts only if unseen, so earlier (higher
/// priority) sources always win.
fn ingest_pair(attributes: &mut BTreeMap<String, String>, raw_key: &str, raw_value: &str) {
    let value = raw_value.trim();
    if raw_key.trim().is_empty() || value.is_empty() {
        return;
    }
    let key = normalize_attribute_key(raw_key);
    if key.is_empty() {
        return;
    }
    attributes.entry(key).or_insert_with(|| value.to_string());
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let by_property = Selector::parse(&format!(r#"meta[property="{}"]"#, name)).ok()?;
    let by_name = Selector::parse(&format!(r#"meta[name="{}"]"#, name)).ok()?;
    document
        .select(&by_property)
        .chain(document.select(&by_name))
        .find_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn element_text(element: &ElementRef) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{extract_identifiers, parse_signals};

    const URL: &str = "https://shop.example.com/p/1";

    #[test]
    fn json_ld_product_block_drives_the_record() {
        let html = r#"
            <html><head>
            <title>Acme Blender X-200 - Acme Store</title>
            <script type="application/ld+json">
            {"@type":"Product","name":"Acme Blender X-200","brand":{"name":"Acme"},
             "description":"Crushes ice.","color":"Black",
             "additionalProperty":[{"name":"Jar Capacity","value":"1.5 L"}]}
            </script>
            </head><body></body></html>
        "#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.title, "Acme Blender X-200");
        assert_eq!(signals.brand.as_deref(), Some("Acme"));
        assert_eq!(signals.description, "Crushes ice.");
        assert_eq!(signals.identifiers.get("model").map(String::as_str), Some("X-200"));
        assert_eq!(signals.attributes.get("color").map(String::as_str), Some("Black"));
        assert_eq!(
            signals.attributes.get("jar_capacity").map(String::as_str),
            Some("1.5 L")
        );
        assert!(signals.schema_present);
    }

    #[test]
    fn brand_as_plain_string_is_accepted() {
        let html = r#"
            <script type="application/ld+json">
            {"@type":["product","Thing"],"name":"Kettle Pro","brand":"Brewster"}
            </script>
        "#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.brand.as_deref(), Some("Brewster"));
        assert_eq!(signals.title, "Kettle Pro");
    }

    #[test]
    fn title_falls_back_through_tag_meta_and_heading() {
        let html = r#"<html><head>
            <meta property="og:title" content="Preview Kettle - MegaMart">
            </head><body><h1>Heading Kettle</h1></body></html>"#;
        let signals = parse_signals(URL, html);
        assert_eq!(signals.title, "Preview Kettle");

        let html = "<html><body><h1>Heading  Kettle</h1></body></html>";
        let signals = parse_signals(URL, html);
        assert_eq!(signals.title, "Heading Kettle");
    }

    #[test]
    fn description_falls_back_to_common_selectors() {
        let html = r#"<html><body>
            <div class="product-description">Soft  and durable.</div>
            </body></html>"#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.description, "Soft and durable.");
    }

    #[test]
    fn structured_data_wins_over_table_values() {
        let html = r#"
            <script type="application/ld+json">
            {"@type":"Product","name":"Phone Z","color":"Blue"}
            </script>
            <table><tr><th>Colour</th><td>Red</td></tr></table>
        "#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.attributes.get("color").map(String::as_str), Some("Blue"));
    }

    #[test]
    fn table_and_definition_list_mining() {
        let html = r#"<html><body>
            <table><tr><th>Material</th><td>ignored</td><td>Steel</td></tr></table>
            <dl><dt>Weight</dt><dd>2.3 kg</dd><dt>Colour</dt><dd>Red</dd></dl>
            </body></html>"#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.attributes.get("material").map(String::as_str), Some("Steel"));
        assert_eq!(signals.attributes.get("weight").map(String::as_str), Some("2.3 kg"));
        assert_eq!(signals.attributes.get("color").map(String::as_str), Some("Red"));
        assert!(!signals.schema_present);
    }

    #[test]
    fn spec_section_list_items_fold_synonyms() {
        let html = r#"<html><body>
            <div id="product-specs"><ul>
              <li>Colour: Red</li>
              <li>Display: 6.1 in</li>
              <li>No separator here</li>
            </ul></div>
            </body></html>"#;

        let signals = parse_signals(URL, html);

        assert_eq!(signals.attributes.get("color").map(String::as_str), Some("Red"));
        assert_eq!(
            signals.attributes.get("screen_size").map(String::as_str),
            Some("6.1 in")
        );
    }

    #[test]
    fn identifier_scans_are_label_anchored() {
        let ids = extract_identifiers("GTIN: 01234567890123 mpn# AB-123 Sku:XYZ99 and 12345678");

        assert_eq!(ids.get("gtin").map(String::as_str), Some("01234567890123"));
        assert_eq!(ids.get("mpn").map(String::as_str), Some("AB-123"));
        assert_eq!(ids.get("sku").map(String::as_str), Some("XYZ99"));
        assert!(ids.get("model").is_none());
    }

    #[test]
    fn identifiers_from_page_text() {
        let html = r#"<html><body>
            <h1>Widget 5000</h1>
            <p>Order details: SKU: WID-5000-BLK, EAN 4006381333931.</p>
            </body></html>"#;

        let signals = parse_signals(URL, html);

        assert_eq!(
            signals.identifiers.get("gtin").map(String::as_str),
            Some("4006381333931")
        );
        assert_eq!(
            signals.identifiers.get("sku").map(String::as_str),
            Some("WID-5000-BLK")
        );
    }

    #[test]
    fn model_heuristic_only_fills_when_unset() {
        let html = r#"<html><head><title>Router AC-1900 MPN: ZZTOP-1</title></head></html>"#;
        let signals = parse_signals(URL, html);
        assert_eq!(
            signals.identifiers.get("model").map(String::as_str),
            Some("AC-1900")
        );

        let html = r#"<html><body>
            <h1>Camera RX/100</h1><p>model no. listed as MODEL: RX100M3</p>
            </body></html>"#;
        let signals = parse_signals(URL, html);
        assert_eq!(
            signals.identifiers.get("model").map(String::as_str),
            Some("RX/100")
        );
    }

    #[test]
    fn degrades_to_empty_record_on_garbage_input() {
        for html in ["", "not html at all", "<script type=\"application/ld+json\">{bad json</script>"] {
            let signals = parse_signals(URL, html);
            assert_eq!(signals.url, URL);
            assert!(signals.title.len() <= 200);
            assert!(!signals.schema_present);
            assert!(signals
                .attributes
                .keys()
                .chain(signals.identifiers.keys())
                .all(|key| key.chars().all(|c| c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || c == '_')));
        }
    }
}
