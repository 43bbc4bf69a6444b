//! File-writing cache decorator
//!
//! [`FileWriteCache`] forwards to an inner cache and additionally writes
//! the signed exchange of every stored resource to disk. File paths come
//! from composable [`MapResourceToPath`] mappings, e.g.
//!
//! ```text
//! UsePhysicalUrlPath.then(AppendExt::new(".sxg")).then(AddBaseDir::new("out"))
//! https://example.org/dir/  ->  out/dir/index.html.sxg
//! ```

use super::traits::{CacheError, CacheKey, CacheResult, ResourceCache};
use crate::packager::FetchRequest;
use crate::resource::Resource;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

/// Default extension of signed exchange files
pub const DEFAULT_SXG_EXTENSION: &str = ".sxg";

/// Maps a resource to a file path
///
/// `path` is the result of the previous mapping in a chain (empty at the
/// start).
pub trait MapResourceToPath: Send + Sync {
    fn map(&self, resource: &Resource, path: PathBuf) -> CacheResult<PathBuf>;
}

/// Chains path mappings
pub trait MapResourceToPathExt: MapResourceToPath + Sized {
    fn then<M: MapResourceToPath>(self, next: M) -> Then<Self, M> {
        Then { first: self, next }
    }
}

impl<T: MapResourceToPath> MapResourceToPathExt for T {}

/// Two mappings applied in sequence
#[derive(Debug, Clone)]
pub struct Then<A, B> {
    first: A,
    next: B,
}

impl<A: MapResourceToPath, B: MapResourceToPath> MapResourceToPath for Then<A, B> {
    fn map(&self, resource: &Resource, path: PathBuf) -> CacheResult<PathBuf> {
        let path = self.first.map(resource, path)?;
        self.next.map(resource, path)
    }
}

/// Uses the path of the resource's physical URL
#[derive(Debug, Clone, Copy, Default)]
pub struct UsePhysicalUrlPath;

impl MapResourceToPath for UsePhysicalUrlPath {
    fn map(&self, resource: &Resource, _path: PathBuf) -> CacheResult<PathBuf> {
        let url = resource.physical_url().ok_or_else(|| {
            CacheError::NoPath(format!("{} has no physical URL", resource.request_url()))
        })?;
        url_to_relative_path(url)
    }
}

/// Uses the path of the resource's validity URL
#[derive(Debug, Clone, Copy, Default)]
pub struct UseValidityUrlPath;

impl MapResourceToPath for UseValidityUrlPath {
    fn map(&self, resource: &Resource, _path: PathBuf) -> CacheResult<PathBuf> {
        let url = resource.validity_url().ok_or_else(|| {
            CacheError::NoPath(format!("{} has no validity URL", resource.request_url()))
        })?;
        url_to_relative_path(url)
    }
}

/// Appends an extension such as `.sxg` to the file name
#[derive(Debug, Clone)]
pub struct AppendExt(String);

impl AppendExt {
    pub fn new(ext: impl Into<String>) -> Self {
        Self(ext.into())
    }
}

impl MapResourceToPath for AppendExt {
    fn map(&self, _resource: &Resource, path: PathBuf) -> CacheResult<PathBuf> {
        let mut name = path.into_os_string();
        name.push(&self.0);
        Ok(PathBuf::from(name))
    }
}

/// Places the path under a base directory
#[derive(Debug, Clone)]
pub struct AddBaseDir(PathBuf);

impl AddBaseDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }
}

impl MapResourceToPath for AddBaseDir {
    fn map(&self, _resource: &Resource, path: PathBuf) -> CacheResult<PathBuf> {
        Ok(self.0.join(path))
    }
}

/// `<dir>/<physical path><ext>`
pub fn sxg_file_mapping(
    dir: impl Into<PathBuf>,
    ext: &str,
) -> Then<Then<UsePhysicalUrlPath, AppendExt>, AddBaseDir> {
    UsePhysicalUrlPath
        .then(AppendExt::new(ext))
        .then(AddBaseDir::new(dir))
}

/// Converts a URL path into a relative file path
fn url_to_relative_path(url: &Url) -> CacheResult<PathBuf> {
    let segments: Vec<&str> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if url.path().ends_with('/') || segments.is_empty() {
        return Err(CacheError::NoPath(format!("{} does not name a file", url)));
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(CacheError::NoPath(format!("{} escapes its directory", url)));
    }
    Ok(segments.iter().collect())
}

/// Produces the validity data served at a resource's validity URL
pub trait ValidityDataGenerator: Send + Sync {
    fn generate(&self, resource: &Resource) -> CacheResult<Vec<u8>>;
}

/// Cache decorator that also writes signed exchanges to files
pub struct FileWriteCache<C> {
    inner: C,
    sxg_path: Box<dyn MapResourceToPath>,
    validity: Option<(Box<dyn MapResourceToPath>, Box<dyn ValidityDataGenerator>)>,
}

impl<C: ResourceCache> FileWriteCache<C> {
    pub fn new(inner: C, sxg_path: impl MapResourceToPath + 'static) -> Self {
        Self {
            inner,
            sxg_path: Box::new(sxg_path),
            validity: None,
        }
    }

    /// Also writes validity data, at the path given by `path`
    pub fn with_validity(
        mut self,
        path: impl MapResourceToPath + 'static,
        generator: impl ValidityDataGenerator + 'static,
    ) -> Self {
        self.validity = Some((Box::new(path), Box::new(generator)));
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ResourceCache> ResourceCache for FileWriteCache<C> {
    fn key(&self, request: &FetchRequest) -> CacheKey {
        self.inner.key(request)
    }

    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Resource>> {
        self.inner.lookup(key).await
    }

    async fn store(&self, key: &CacheKey, resource: &Resource) -> CacheResult<()> {
        let exchange = resource
            .exchange()
            .ok_or_else(|| CacheError::NotPackaged(resource.request_url().clone()))?;

        let path = self.sxg_path.map(resource, PathBuf::new())?;
        write_atomic(path.clone(), exchange.signed.clone()).await?;
        tracing::debug!("Wrote {} to {}", resource.request_url(), path.display());

        if let Some((mapping, generator)) = &self.validity {
            let path = mapping.map(resource, PathBuf::new())?;
            let data = generator.generate(resource)?;
            write_atomic(path.clone(), data).await?;
            tracing::debug!("Wrote validity data to {}", path.display());
        }

        self.inner.store(key, resource).await
    }
}

/// Writes `bytes` to a temporary file next to `path`, then renames it
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> CacheResult<()> {
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(physical: &str, validity: &str) -> Resource {
        let mut resource = Resource::new(Url::parse("https://example.org/").unwrap());
        resource
            .set_physical_url(Url::parse(physical).unwrap())
            .unwrap();
        resource
            .set_validity_url(Url::parse(validity).unwrap())
            .unwrap();
        resource
    }

    #[test]
    fn test_physical_path_mapping() {
        let r = resource(
            "https://example.org/dir/index.html",
            "https://example.org/dir/index.html.validity.1557743400",
        );
        let path = sxg_file_mapping("out", ".sxg")
            .map(&r, PathBuf::new())
            .unwrap();
        assert_eq!(path, Path::new("out").join("dir").join("index.html.sxg"));
    }

    #[test]
    fn test_validity_path_mapping() {
        let r = resource(
            "https://example.org/hello.html",
            "https://example.org/hello.html.validity.1557743400",
        );
        let path = UseValidityUrlPath
            .then(AddBaseDir::new("/srv"))
            .map(&r, PathBuf::new())
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/hello.html.validity.1557743400"));
    }

    #[test]
    fn test_directory_url_has_no_path() {
        let r = resource("https://example.org/dir/", "https://example.org/v");
        let result = UsePhysicalUrlPath.map(&r, PathBuf::new());
        assert!(matches!(result, Err(CacheError::NoPath(_))));
    }

    #[test]
    fn test_missing_physical_url() {
        let r = Resource::new(Url::parse("https://example.org/a.css").unwrap());
        assert!(UsePhysicalUrlPath.map(&r, PathBuf::new()).is_err());
    }
}
