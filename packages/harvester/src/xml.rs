//! XML helpers for navigating OAI-PMH response trees.
//!
//! All lookups compare local names only, so documents that use a default
//! namespace, a prefixed namespace or no namespace at all are treated alike.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use roxmltree::Node;

/// An ampersand, plus the reference it starts when it starts a valid one.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static AMPERSAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?P<reference>#[0-9]+;|#x[0-9a-fA-F]+;|amp;|lt;|gt;|quot;|apos;)?")
        .expect("valid regex")
});

/// Escape every `&` that does not start a predefined entity or a character
/// reference.
///
/// Repositories routinely emit bare ampersands and HTML entities such as
/// `&eacute;`; after escaping they survive parsing as literal text.
///
/// # Examples
/// ```
/// use oai_harvester::xml::escape_stray_ampersands;
///
/// assert_eq!(escape_stray_ampersands("Tom & Jerry"), "Tom &amp; Jerry");
/// assert_eq!(escape_stray_ampersands("caf&eacute;"), "caf&amp;eacute;");
/// assert_eq!(escape_stray_ampersands("a &amp; b &#233;"), "a &amp; b &#233;");
/// ```
pub fn escape_stray_ampersands(text: &str) -> Cow<'_, str> {
    AMPERSAND_PATTERN.replace_all(text, |caps: &regex::Captures<'_>| match caps.name("reference") {
        Some(reference) => format!("&{}", reference.as_str()),
        None => "&amp;".to_string(),
    })
}

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::get_tag_name;
///
/// let xml = r#"<oai:root xmlns:oai="http://www.openarchives.org/OAI/2.0/"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "root");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check if a node is an element with the given local name.
pub fn has_tag(node: Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && get_tag_name(node) == tag
}

/// Find the first child element with the given tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::find_child;
///
/// let xml = r#"<header><identifier>oai:x:1</identifier></header>"#;
/// let doc = Document::parse(xml).unwrap();
/// let root = doc.root_element();
///
/// assert!(find_child(root, "identifier").is_some());
/// assert!(find_child(root, "datestamp").is_none());
/// ```
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| has_tag(*child, tag))
}

/// Find all child elements with the given tag name.
pub fn find_children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| has_tag(*child, tag))
}

/// Get the text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Trimmed text of the first child with the given tag, if present and non-empty.
pub fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    find_child(node, tag)
        .map(get_text)
        .filter(|s| !s.is_empty())
}

/// Trimmed texts of all children with the given tag, skipping empty ones.
pub fn children_text<'a>(node: Node<'a, '_>, tag: &'a str) -> Vec<String> {
    find_children(node, tag)
        .map(get_text)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn test_lookups_ignore_namespace() {
        let xml = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
            <header><setSpec>a</setSpec><setSpec> </setSpec><setSpec>b</setSpec></header>
        </OAI-PMH>"#;
        let doc = Document::parse(xml).unwrap();
        let header = find_child(doc.root_element(), "header").unwrap();

        assert_eq!(children_text(header, "setSpec"), vec!["a", "b"]);
        assert_eq!(child_text(header, "identifier"), None);
    }

    #[test]
    fn test_get_text_trims() {
        let doc = Document::parse("<identifier>\n  oai:x:1 \n</identifier>").unwrap();
        assert_eq!(get_text(doc.root_element()), "oai:x:1");
    }

    #[test]
    fn test_escape_keeps_valid_references() {
        assert!(matches!(escape_stray_ampersands("<t>plain</t>"), Cow::Borrowed(_)));
        let text = "<t a=\"x&quot;y\">&lt;b&gt; &#x41; &#65; &apos;</t>";
        assert_eq!(escape_stray_ampersands(text), text);
    }

    #[test]
    fn test_escaped_text_parses() {
        let escaped = escape_stray_ampersands("<title>R&D, caf&eacute;&nbsp;&amp; more &</title>");
        let doc = Document::parse(&escaped).unwrap();
        assert_eq!(get_text(doc.root_element()), "R&D, caf&eacute;&nbsp;& more &");
    }
}
