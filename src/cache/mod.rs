//! Resource caches
//!
//! Packaged resources are stored under a [`CacheKey`] derived from the
//! request. [`MemoryCache`] is the baseline store; [`FileWriteCache`]
//! decorates any cache to also write signed exchanges to disk.

mod file;
mod memory;
mod traits;

pub use file::{
    sxg_file_mapping, AddBaseDir, AppendExt, FileWriteCache, MapResourceToPath,
    MapResourceToPathExt, Then, UsePhysicalUrlPath, UseValidityUrlPath, ValidityDataGenerator,
    DEFAULT_SXG_EXTENSION,
};
pub use memory::MemoryCache;
pub use traits::{CacheError, CacheKey, CacheResult, ResourceCache};
