use super::document::Document;
use super::tasks::{ExtractSubContentTypes, HtmlResponse, HtmlTask, HtmlTaskSet};
use crate::processor::{Processor, ProcessorError, Response};
use std::borrow::Cow;

/// Options of the HTML processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlConfig {
    pub task_set: HtmlTaskSet,
    /// Re-render the payload from the parse tree after the tasks ran
    pub modify_html: bool,
    /// Record embedded media types under `sub-content-type`
    pub sub_content_types: bool,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            task_set: HtmlTaskSet::Conservative,
            modify_html: false,
            sub_content_types: true,
        }
    }
}

/// Parses HTML payloads and runs HTML tasks over them
pub struct HtmlProcessor {
    tasks: Vec<Box<dyn HtmlTask>>,
    modify_html: bool,
}

impl HtmlProcessor {
    pub fn new(config: &HtmlConfig) -> Self {
        let mut tasks = config.task_set.tasks();
        if config.sub_content_types {
            tasks.push(Box::new(ExtractSubContentTypes));
        }
        Self::with_tasks(tasks, config.modify_html)
    }

    pub fn with_tasks(tasks: Vec<Box<dyn HtmlTask>>, modify_html: bool) -> Self {
        Self { tasks, modify_html }
    }
}

impl Processor for HtmlProcessor {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        // Lossy decoding is only safe while the original bytes are kept
        let document = {
            let source = if self.modify_html {
                Cow::Borrowed(std::str::from_utf8(&response.payload).map_err(|e| {
                    ProcessorError::HtmlParse(format!("payload is not valid UTF-8: {}", e))
                })?)
            } else {
                String::from_utf8_lossy(&response.payload)
            };
            Document::parse(&source, response.url.clone())
        };

        let mut resp = HtmlResponse { response, document };
        for task in &self.tasks {
            task.run(&mut resp)?;
        }

        if self.modify_html {
            resp.response.payload = resp.document.render().into_bytes();
        }
        tracing::debug!(
            "Processed HTML of {}: {} preloads",
            resp.response.url,
            resp.response.preloads.len()
        );
        Ok(())
    }
}
