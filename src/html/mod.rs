//! HTML processing
//!
//! This module parses HTML payloads and runs a configurable list of tasks
//! over the parse tree to discover preloads and embedded content types.
//!
//! # Components
//!
//! - `Document`: parse tree with head/body lookup and base URL resolution
//! - `HtmlTask`: one pass over the tree (`ExtractPreloadTags`,
//!   `PreloadStylesheets`, `InsecurePreloadScripts`, `ExtractSubContentTypes`)
//! - `HtmlProcessor`: the `Processor` that ties the two together

mod document;
mod processor;
mod tasks;

pub use document::{find_attr, find_node, get_attr, is_element, traverse, Document, Visit};
pub use processor::{HtmlConfig, HtmlProcessor};
pub use tasks::{
    ExtractPreloadTags, ExtractSubContentTypes, HtmlResponse, HtmlTask, HtmlTaskSet,
    InsecurePreloadScripts, PreloadStylesheets, SUB_CONTENT_TYPE,
};
