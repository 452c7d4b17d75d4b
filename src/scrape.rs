use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

fn anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a").expect("anchor selector"))
}

/// First text node in document order whose content matches `pattern`,
/// trimmed.
pub fn first_text_matching(doc: &Html, pattern: &Regex) -> Option<String> {
    doc.root_element()
        .text()
        .find(|text| pattern.is_match(text))
        .map(|text| text.trim().to_string())
}

/// Locate an element by tag name + text pattern, then return the text of the
/// parent's child node at a fixed index. Each vendor template encodes its own
/// (tag, pattern, index) triple; the index counts every child node, text and
/// element alike.
pub fn marker_parent_content(
    doc: &Html,
    marker_tag: &str,
    text_pattern: &Regex,
    child_index: usize,
) -> Option<String> {
    for element in doc.root_element().descendants().filter_map(ElementRef::wrap) {
        if !element.value().name().eq_ignore_ascii_case(marker_tag) {
            continue;
        }
        let text = element.text().collect::<Vec<_>>().join("");
        if !text_pattern.is_match(&text) {
            continue;
        }
        let parent = element.parent()?;
        let child = parent.children().nth(child_index)?;
        if let Some(text) = child.value().as_text() {
            return Some(text.to_string());
        }
        return ElementRef::wrap(child).map(|el| el.text().collect::<Vec<_>>().join(""));
    }
    None
}

/// `value` attribute of the element carrying the given `id`.
pub fn value_by_id(doc: &Html, id: &str) -> Option<String> {
    attr_by_id(doc, id, "value")
}

pub fn attr_by_id(doc: &Html, id: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[id="{id}"]"#)).ok()?;
    doc.select(&selector)
        .next()?
        .value()
        .attr(attr)
        .map(str::to_string)
}

/// `href` of the first `<a>` whose text matches `pattern`.
pub fn anchor_href_matching(doc: &Html, pattern: &Regex) -> Option<String> {
    for anchor in doc.select(anchor_selector()) {
        let text = anchor.text().collect::<Vec<_>>().join("");
        if pattern.is_match(text.trim()) {
            return anchor.value().attr("href").map(str::to_string);
        }
    }
    None
}

/// First capture group of `pattern` applied to raw, unparsed markup.
///
/// This is the fragile fallback for values that never make it into the DOM as
/// attributes (inline script text, re-serialized fragments). Keep its call
/// sites few and covered by fixtures.
pub fn raw_capture(raw: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Value assigned to a named field inside inline script text, written as a
/// selector-plus-value pair: `#Name [value="..."]`.
pub fn inline_selector_value(raw: &str, name: &str) -> Option<String> {
    let pattern =
        Regex::new(&format!(r#"#{} \[value="(.+)"\]"#, regex::escape(name))).ok()?;
    raw_capture(raw, &pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_matching_finds_currency_node() {
        let doc = Html::parse_document(
            "<html><body><p>Total del viaje</p><p> MX$125.00 </p></body></html>",
        );
        let pattern = Regex::new(r"MX\$.+").expect("pattern");
        assert_eq!(
            first_text_matching(&doc, &pattern),
            Some("MX$125.00".to_string())
        );
    }

    #[test]
    fn first_text_matching_returns_none_without_match() {
        let doc = Html::parse_document("<html><body><p>sin total</p></body></html>");
        let pattern = Regex::new(r"MX\$.+").expect("pattern");
        assert_eq!(first_text_matching(&doc, &pattern), None);
    }

    #[test]
    fn marker_parent_content_returns_indexed_sibling_text() {
        // children of <p>: [strong, " ", span, "MX$45.00"]
        let doc = Html::parse_document(
            r#"<p><strong>Total:</strong> <span>pagado</span>MX$45.00</p>"#,
        );
        let pattern = Regex::new("Total:").expect("pattern");
        assert_eq!(
            marker_parent_content(&doc, "strong", &pattern, 3),
            Some("MX$45.00".to_string())
        );
    }

    #[test]
    fn marker_parent_content_returns_element_text_at_index() {
        let doc = Html::parse_document(
            "<table><tr><td>TOTAL</td><td></td><td></td><td></td><td></td><td>$ 499.00</td></tr></table>",
        );
        let pattern = Regex::new("TOTAL").expect("pattern");
        assert_eq!(
            marker_parent_content(&doc, "td", &pattern, 5),
            Some("$ 499.00".to_string())
        );
    }

    #[test]
    fn value_by_id_reads_input_value() {
        let doc = Html::parse_document(r#"<input id="RRfc" value="IVE950901EI6">"#);
        assert_eq!(value_by_id(&doc, "RRfc"), Some("IVE950901EI6".to_string()));
        assert_eq!(value_by_id(&doc, "RCalle"), None);
    }

    #[test]
    fn anchor_href_matching_picks_matching_link() {
        let doc = Html::parse_document(
            r#"<a href="https://example.com/ayuda">Ayuda</a>
               <a href="https://example.com/boleto.pdf">Descarga tu Boleto</a>"#,
        );
        let pattern = Regex::new("Boleto").expect("pattern");
        assert_eq!(
            anchor_href_matching(&doc, &pattern),
            Some("https://example.com/boleto.pdf".to_string())
        );
    }

    #[test]
    fn inline_selector_value_reads_script_embedded_field() {
        let raw = r#"<script>
            $('#RNac [value="MEX"]').attr('selected', 'selected');
            $('#REstado [value="CDMX"]').attr('selected', 'selected');
        </script>"#;
        assert_eq!(inline_selector_value(raw, "RNac"), Some("MEX".to_string()));
        assert_eq!(
            inline_selector_value(raw, "REstado"),
            Some("CDMX".to_string())
        );
        assert_eq!(inline_selector_value(raw, "RPais"), None);
    }
}
