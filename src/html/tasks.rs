//! HTML tasks
//!
//! Each task walks the parse tree of an [`HtmlResponse`] and records what it
//! finds on the response: preload directives, or sub-content media types
//! under [`SUB_CONTENT_TYPE`].

use super::document::{find_attr, get_attr, is_element, traverse, Document, Visit};
use crate::preload::{has_token, Preload};
use crate::processor::{ProcessorError, Response};
use scraper::node::Element;
use scraper::Node;
use serde::Deserialize;

/// `extra_data` key listing media types embedded in an HTML document
pub const SUB_CONTENT_TYPE: &str = "sub-content-type";

/// A response together with its parsed HTML document
pub struct HtmlResponse<'r> {
    pub response: &'r mut Response,
    pub document: Document,
}

/// A visitor over an HTML document
pub trait HtmlTask: Send + Sync {
    fn run(&self, resp: &mut HtmlResponse<'_>) -> Result<(), ProcessorError>;
}

/// Predefined task sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlTaskSet {
    /// Only honors preloads the document declares itself
    #[default]
    Conservative,
    /// Also preloads stylesheets and blocking scripts
    Aggressive,
}

impl HtmlTaskSet {
    pub fn tasks(self) -> Vec<Box<dyn HtmlTask>> {
        match self {
            Self::Conservative => vec![Box::new(ExtractPreloadTags)],
            Self::Aggressive => vec![
                Box::new(ExtractPreloadTags),
                Box::new(PreloadStylesheets),
                Box::new(InsecurePreloadScripts),
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
        }
    }
}

/// Adds every `<link rel="preload">` of the document as a preload
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractPreloadTags;

impl HtmlTask for ExtractPreloadTags {
    fn run(&self, resp: &mut HtmlResponse<'_>) -> Result<(), ProcessorError> {
        let document = &resp.document;
        let mut found = Vec::new();

        traverse::<ProcessorError, _>(document.root(), |node| {
            let Some(el) = node.value().as_element() else {
                return Ok(Visit::Continue);
            };
            if is_element(el, "link") && has_token(get_attr(el, "rel"), "preload") {
                if let Some(url) = document.resolve(get_attr(el, "href")) {
                    let mut preload = Preload::new(url);
                    for key in ["as", "media", "type"] {
                        if let Some(value) = find_attr(el, key) {
                            preload = preload.with_param(key, value);
                        }
                    }
                    if find_attr(el, "crossorigin").is_some() {
                        preload = preload.with_flag("crossorigin");
                    }
                    found.push(preload);
                }
            }
            Ok(Visit::Continue)
        })?;

        for preload in found {
            resp.response.add_preload(preload);
        }
        Ok(())
    }
}

/// Preloads the stylesheets linked from `<head>`
///
/// Alternate stylesheets are not preloaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreloadStylesheets;

impl HtmlTask for PreloadStylesheets {
    fn run(&self, resp: &mut HtmlResponse<'_>) -> Result<(), ProcessorError> {
        let document = &resp.document;
        let Some(head) = document.head() else {
            return Ok(());
        };
        let mut found = Vec::new();

        traverse::<ProcessorError, _>(head, |node| {
            let Some(el) = node.value().as_element() else {
                return Ok(Visit::Continue);
            };
            if is_element(el, "link") {
                let rel = get_attr(el, "rel");
                if has_token(rel, "stylesheet") && !has_token(rel, "alternate") {
                    if let Some(url) = document.resolve(get_attr(el, "href")) {
                        found.push(Preload::new(url).with_param("as", "style"));
                    }
                }
            }
            Ok(Visit::Continue)
        })?;

        for preload in found {
            resp.response.add_preload(preload);
        }
        Ok(())
    }
}

/// Tags whose subtree cannot hold visible content
const SKIP_TAGS: &[&str] = &["base", "link", "meta", "noscript", "style", "title"];

/// Tags that render content, ending the top of the document
const STOP_TAGS: &[&str] = &[
    "applet", "audio", "button", "embed", "iframe", "img", "input", "meter", "object", "select",
    "textarea", "video",
];

/// Preloads synchronous scripts that appear before any rendered content
///
/// Such scripts block the first paint, so preloading them is a win even
/// though the packager cannot know whether they are safe to serve from a
/// signed exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecurePreloadScripts;

impl InsecurePreloadScripts {
    fn handle_script(document: &Document, el: &Element) -> Option<Preload> {
        if find_attr(el, "async").is_some() || find_attr(el, "defer").is_some() {
            return None;
        }
        let src = find_attr(el, "src")?;
        document
            .resolve(src)
            .map(|url| Preload::new(url).with_param("as", "script"))
    }
}

impl HtmlTask for InsecurePreloadScripts {
    fn run(&self, resp: &mut HtmlResponse<'_>) -> Result<(), ProcessorError> {
        let document = &resp.document;
        let mut found = Vec::new();

        traverse(document.root(), |node| match node.value() {
            Node::Document => Ok(Visit::Continue),
            Node::Element(el) => {
                let name = el.name().to_ascii_lowercase();
                if name == "script" {
                    found.extend(Self::handle_script(document, el));
                    Ok(Visit::Skip)
                } else if SKIP_TAGS.contains(&name.as_str()) {
                    Ok(Visit::Skip)
                } else if STOP_TAGS.contains(&name.as_str()) {
                    Ok(Visit::Stop)
                } else {
                    Ok(Visit::Continue)
                }
            }
            Node::Text(text) => {
                if text.chars().any(|c| !c.is_whitespace()) {
                    Ok(Visit::Stop)
                } else {
                    Ok(Visit::Skip)
                }
            }
            Node::Comment(_) | Node::Doctype(_) => Ok(Visit::Skip),
            other => Err(ProcessorError::UnexpectedNode(format!("{:?}", other))),
        })?;

        for preload in found {
            resp.response.add_preload(preload);
        }
        Ok(())
    }
}

/// Records the media types of content embedded in the document
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSubContentTypes;

impl ExtractSubContentTypes {
    fn content_type(el: &Element) -> Option<String> {
        let default = match el.name().to_ascii_lowercase().as_str() {
            "math" => "application/mathml+xml",
            "script" if find_attr(el, "src").is_none() => "application/javascript",
            "style" => "text/style",
            "svg" => "image/svg+xml",
            _ => return None,
        };
        let declared = get_attr(el, "type").trim();
        if declared.is_empty() {
            Some(default.to_string())
        } else {
            Some(declared.to_ascii_lowercase())
        }
    }
}

impl HtmlTask for ExtractSubContentTypes {
    fn run(&self, resp: &mut HtmlResponse<'_>) -> Result<(), ProcessorError> {
        let mut found = Vec::new();
        traverse::<ProcessorError, _>(resp.document.root(), |node| {
            if let Some(content_type) = node.value().as_element().and_then(Self::content_type) {
                found.push(content_type);
            }
            Ok(Visit::Continue)
        })?;

        for content_type in found {
            resp.response
                .extra_data
                .add_unique(SUB_CONTENT_TYPE, content_type);
        }
        Ok(())
    }
}
