use super::{Processor, ProcessorError, Response};
use crate::url::same_origin;

/// Stops cross-origin preload targets from being packaged
///
/// The preloads themselves stay on the response as hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameOrigin;

impl Processor for SameOrigin {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        let origin = response.url.clone();
        for preload in &mut response.preloads {
            if !same_origin(preload.url(), &origin) {
                tracing::debug!("Cross-origin preload {} kept as hint only", preload.url());
                preload.clear_resources();
            }
        }
        Ok(())
    }
}
