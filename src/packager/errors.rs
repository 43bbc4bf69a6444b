use crate::PackagerError;
use std::fmt;
use url::Url;

/// Errors collected over one packaging run, in discovery order
///
/// The same URL may appear more than once if it failed more than once.
#[derive(Debug, Default)]
pub struct ErrorBundle {
    errors: Vec<PackagerError>,
}

impl ErrorBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: PackagerError) {
        self.errors.push(error);
    }

    /// Appends every error of `other`, keeping its order
    pub fn extend(&mut self, other: ErrorBundle) {
        self.errors.extend(other.errors);
    }

    pub fn errors(&self) -> &[PackagerError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<PackagerError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// URLs of the failed resources, in discovery order
    pub fn urls(&self) -> impl Iterator<Item = &Url> {
        self.errors.iter().map(PackagerError::url)
    }

    /// `Ok(())` if nothing failed, the bundle otherwise
    pub fn into_result(self) -> Result<(), ErrorBundle> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<PackagerError> for ErrorBundle {
    fn from(error: PackagerError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ErrorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "error with processing {}: {}", error.url(), error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorBundle {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
