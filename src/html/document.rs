//! Parsed HTML documents and tree walking
//!
//! Wraps a `scraper` parse tree with the handful of lookups the HTML tasks
//! need. Attribute lookups only see attributes in the empty namespace, so
//! foreign attributes such as `xlink:href` on SVG content are invisible.

use ego_tree::{NodeId, NodeRef};
use scraper::node::Element;
use scraper::{Html, Node};
use url::Url;

/// What the traversal does after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into the node's children
    Continue,
    /// Do not descend into the node's children
    Skip,
    /// End the whole traversal successfully
    Stop,
}

/// A parsed HTML document
pub struct Document {
    html: Html,
    url: Url,
    base_url: Url,
    head: Option<NodeId>,
    body: Option<NodeId>,
}

impl Document {
    /// Parses `source` as a complete HTML document served from `url`
    ///
    /// Parsing never fails: malformed markup is repaired the way browsers
    /// repair it.
    ///
    /// # Arguments
    ///
    /// * `source` - The HTML text
    /// * `url` - URL the document was served from
    ///
    /// # Returns
    ///
    /// The document, with its base URL taken from the first `<base>` in
    /// `<head>` when that has a valid `href`
    ///
    /// # Example
    ///
    /// ```
    /// use sxg_packager::html::Document;
    /// use url::Url;
    ///
    /// let url = Url::parse("https://example.org/page.html").unwrap();
    /// let document = Document::parse(r#"<base href="/static/">"#, url);
    /// assert_eq!(document.base_url().as_str(), "https://example.org/static/");
    /// ```
    pub fn parse(source: &str, url: Url) -> Self {
        let html = Html::parse_document(source);
        let root = html.tree.root();
        let head = find_node(root, "head").map(|n| n.id());
        let body = find_node(root, "body").map(|n| n.id());

        let mut document = Self {
            html,
            base_url: url.clone(),
            url,
            head,
            body,
        };
        document.base_url = document.resolve_base_url();
        document
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL relative references resolve against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn root(&self) -> NodeRef<'_, Node> {
        self.html.tree.root()
    }

    pub fn head(&self) -> Option<NodeRef<'_, Node>> {
        self.head.and_then(|id| self.html.tree.get(id))
    }

    pub fn body(&self) -> Option<NodeRef<'_, Node>> {
        self.body.and_then(|id| self.html.tree.get(id))
    }

    /// Resolves `href` against the base URL
    ///
    /// Malformed references are logged and yield `None`.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match self.base_url.join(href) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Skipping malformed URL '{}' in {}: {}", href, self.url, e);
                None
            }
        }
    }

    /// Serializes the tree back to HTML
    pub fn render(&self) -> String {
        self.html.html()
    }

    fn resolve_base_url(&self) -> Url {
        // Only the first <base> counts, with or without an href
        let href = self
            .head()
            .and_then(|head| find_node(head, "base"))
            .and_then(|base| base.value().as_element())
            .and_then(|el| find_attr(el, "href"));

        match href.map(|href| self.url.join(href.trim())) {
            Some(Ok(base)) => base,
            Some(Err(e)) => {
                tracing::warn!("Ignoring malformed <base href> in {}: {}", self.url, e);
                self.url.clone()
            }
            None => self.url.clone(),
        }
    }
}

/// Finds the first element named `tag` in pre-order, `subtree` included
pub fn find_node<'a>(subtree: NodeRef<'a, Node>, tag: &str) -> Option<NodeRef<'a, Node>> {
    subtree.descendants().find(|node| {
        node.value()
            .as_element()
            .is_some_and(|el| el.name().eq_ignore_ascii_case(tag))
    })
}

/// Looks up an attribute by ASCII case-insensitive name
///
/// Attributes with a namespace are never matched.
pub fn find_attr<'a>(element: &'a Element, key: &str) -> Option<&'a str> {
    element
        .attrs
        .iter()
        .find(|(name, _)| name.ns.is_empty() && (&*name.local).eq_ignore_ascii_case(key))
        .map(|(_, value)| &**value)
}

/// Attribute value, or the empty string when absent
pub fn get_attr<'a>(element: &'a Element, key: &str) -> &'a str {
    find_attr(element, key).unwrap_or("")
}

/// Returns true if the element is named `tag`
pub fn is_element(element: &Element, tag: &str) -> bool {
    element.name().eq_ignore_ascii_case(tag)
}

/// Walks `subtree` depth-first in pre-order
///
/// The visitor decides per node whether to descend, skip the node's
/// children, or stop; an error from the visitor aborts the walk.
///
/// # Arguments
///
/// * `subtree` - First node visited
/// * `visit` - Called once per node, returns what to do next
///
/// # Returns
///
/// * `Ok(())` - The walk finished or a visitor returned [`Visit::Stop`]
/// * `Err(E)` - The first error a visitor returned
///
/// # Example
///
/// ```
/// use sxg_packager::html::{traverse, Document, Visit};
/// use url::Url;
///
/// let url = Url::parse("https://example.org/").unwrap();
/// let document = Document::parse("<p>one</p><img><p>two</p>", url);
///
/// let mut paragraphs = 0;
/// traverse::<(), _>(document.root(), |node| {
///     match node.value().as_element().map(|el| el.name()) {
///         Some("p") => paragraphs += 1,
///         Some("img") => return Ok(Visit::Stop),
///         _ => {}
///     }
///     Ok(Visit::Continue)
/// })
/// .unwrap();
/// assert_eq!(paragraphs, 1);
/// ```
pub fn traverse<'a, E, F>(subtree: NodeRef<'a, Node>, mut visit: F) -> Result<(), E>
where
    F: FnMut(NodeRef<'a, Node>) -> Result<Visit, E>,
{
    let mut stack = vec![subtree];
    while let Some(node) = stack.pop() {
        match visit(node)? {
            Visit::Continue => stack.extend(node.children().rev()),
            Visit::Skip => {}
            Visit::Stop => return Ok(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Document {
        Document::parse(source, Url::parse("https://example.org/dir/page.html").unwrap())
    }

    fn element_names(document: &Document) -> Vec<String> {
        let mut names = Vec::new();
        traverse::<(), _>(document.root(), |node| {
            if let Some(el) = node.value().as_element() {
                names.push(el.name().to_string());
            }
            Ok(Visit::Continue)
        })
        .unwrap();
        names
    }

    #[test]
    fn test_head_and_body_found() {
        let document = parse("<p>hello</p>");
        assert!(document.head().is_some());
        assert!(document.body().is_some());
        assert!(find_node(document.body().unwrap(), "p").is_some());
        assert!(find_node(document.head().unwrap(), "p").is_none());
    }

    #[test]
    fn test_find_node_includes_subtree_root() {
        let document = parse("<p>hello</p>");
        let body = document.body().unwrap();
        assert_eq!(find_node(body, "body").map(|n| n.id()), Some(body.id()));
    }

    #[test]
    fn test_traverse_pre_order() {
        let document = parse("<div><p><b>x</b></p><span></span></div>");
        let names = element_names(&document);
        assert_eq!(names, vec!["html", "head", "body", "div", "p", "b", "span"]);
    }

    #[test]
    fn test_traverse_skip_and_stop() {
        let document = parse("<div><p><b>x</b></p><span></span></div><em></em>");
        let mut seen = Vec::new();
        traverse::<(), _>(document.root(), |node| {
            let Some(el) = node.value().as_element() else {
                return Ok(Visit::Continue);
            };
            seen.push(el.name().to_string());
            Ok(match el.name() {
                "p" => Visit::Skip,
                "span" => Visit::Stop,
                _ => Visit::Continue,
            })
        })
        .unwrap();
        assert_eq!(seen, vec!["html", "head", "body", "div", "p", "span"]);
    }

    #[test]
    fn test_traverse_propagates_error() {
        let document = parse("<div><p></p></div>");
        let result = traverse(document.root(), |node| match node.value().as_element() {
            Some(el) if el.name() == "p" => Err("found p"),
            _ => Ok(Visit::Continue),
        });
        assert_eq!(result, Err("found p"));
    }

    #[test]
    fn test_find_attr_case_insensitive() {
        let document = parse(r#"<link REL="Stylesheet" href="a.css">"#);
        let link = find_node(document.root(), "link").unwrap();
        let el = link.value().as_element().unwrap();
        assert_eq!(find_attr(el, "rel"), Some("Stylesheet"));
        assert_eq!(find_attr(el, "HREF"), Some("a.css"));
        assert_eq!(find_attr(el, "media"), None);
        assert_eq!(get_attr(el, "media"), "");
    }

    #[test]
    fn test_foreign_attributes_invisible() {
        let document = parse(
            r#"<svg><a xlink:href="https://example.org/x" href="/y"></a></svg>"#,
        );
        let a = find_node(document.root(), "a").unwrap();
        let el = a.value().as_element().unwrap();
        assert_eq!(find_attr(el, "href"), Some("/y"));
    }

    #[test]
    fn test_base_url_defaults_to_document_url() {
        let document = parse("<title>t</title>");
        assert_eq!(document.base_url(), document.url());
    }

    #[test]
    fn test_base_url_from_head() {
        let document = parse(r#"<base href="/static/"><link rel="stylesheet" href="a.css">"#);
        assert_eq!(document.base_url().as_str(), "https://example.org/static/");
        assert_eq!(
            document.resolve("a.css").unwrap().as_str(),
            "https://example.org/static/a.css"
        );
    }

    #[test]
    fn test_first_base_without_href_keeps_document_url() {
        let document = parse(r#"<base target="_blank"><base href="https://cdn.example.org/">"#);
        assert_eq!(document.base_url(), document.url());
    }

    #[test]
    fn test_only_first_base_counts() {
        let document = parse(
            r#"<base href="https://cdn.example.org/"><base href="https://other.example.org/">"#,
        );
        assert_eq!(document.base_url().as_str(), "https://cdn.example.org/");
    }

    #[test]
    fn test_malformed_base_href_ignored() {
        let document = parse(r#"<base href="http://[::1">"#);
        assert_eq!(document.base_url(), document.url());
    }

    #[test]
    fn test_resolve_malformed_href() {
        let document = parse("");
        assert!(document.resolve("https://[bad").is_none());
        assert!(document.resolve("   ").is_none());
    }

    #[test]
    fn test_render_round_trip_keeps_content() {
        let document = parse("<p>Hello, world!</p>");
        let rendered = document.render();
        assert!(rendered.contains("<p>Hello, world!</p>"));
        assert!(rendered.starts_with("<html>"));
    }
}
