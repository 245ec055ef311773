use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// External collaborator that turns an opaque artifact identifier into a
/// local, loadable file path. Implementations fetch once and reuse the local
/// copy thereafter; how the bytes get there (bundled, copied, downloaded) is
/// their business.
pub trait ArtifactSource: Send + Sync {
    fn fetch(&self, artifact_id: &str) -> Result<PathBuf>;
}

/// Resolves artifact identifiers as file names inside a models directory.
/// Absolute identifiers are honored as-is.
pub struct DirArtifactSource {
    models_dir: PathBuf,
}

impl DirArtifactSource {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

impl ArtifactSource for DirArtifactSource {
    fn fetch(&self, artifact_id: &str) -> Result<PathBuf> {
        let candidate = Path::new(artifact_id);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.models_dir.join(candidate)
        };
        if !resolved.exists() {
            return Err(Error::ModelUnavailable(format!(
                "Model artifact not found: {}",
                resolved.display()
            )));
        }
        Ok(resolved)
    }
}

/// Wraps another source with a fetch-once local cache. The cached file name
/// is derived from the identifier hash, so distinct artifacts never collide
/// and repeated fetches reuse the same copy.
pub struct CachedArtifactSource<S> {
    inner: S,
    cache_dir: PathBuf,
}

impl<S: ArtifactSource> CachedArtifactSource<S> {
    pub fn new(inner: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_path(&self, artifact_id: &str) -> PathBuf {
        let hash = xxh3_64(artifact_id.as_bytes());
        let ext = Path::new(artifact_id)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        self.cache_dir.join(format!("{hash:016x}.{ext}"))
    }
}

impl<S: ArtifactSource> ArtifactSource for CachedArtifactSource<S> {
    fn fetch(&self, artifact_id: &str) -> Result<PathBuf> {
        let cached = self.cache_path(artifact_id);
        if cached.exists() {
            log::info!("Reusing cached artifact: {}", cached.display());
            return Ok(cached);
        }
        let origin = self.inner.fetch(artifact_id)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::copy(&origin, &cached)?;
        log::info!(
            "Cached artifact {} -> {}",
            origin.display(),
            cached.display()
        );
        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        path: PathBuf,
        fetches: AtomicUsize,
    }

    impl ArtifactSource for &CountingSource {
        fn fetch(&self, _artifact_id: &str) -> Result<PathBuf> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.path.clone())
        }
    }

    #[test]
    fn dir_source_resolves_relative_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.onnx"), b"stub").unwrap();
        let source = DirArtifactSource::new(dir.path());
        let resolved = source.fetch("m.onnx").unwrap();
        assert_eq!(resolved, dir.path().join("m.onnx"));
    }

    #[test]
    fn dir_source_missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirArtifactSource::new(dir.path());
        let err = source.fetch("absent.onnx").unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[test]
    fn cached_source_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let origin = dir.path().join("origin.onnx");
        std::fs::write(&origin, b"weights").unwrap();
        let counting = CountingSource {
            path: origin,
            fetches: AtomicUsize::new(0),
        };
        let cache_dir = dir.path().join("cache");
        let source = CachedArtifactSource::new(&counting, &cache_dir);

        let first = source.fetch("origin.onnx").unwrap();
        let second = source.fetch("origin.onnx").unwrap();
        assert_eq!(first, second);
        assert_eq!(counting.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"weights");
    }
}
