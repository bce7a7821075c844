/// Asset resolution
///
/// Turns a logical sound name into a local, playable file. Bundled sounds win,
/// then the download cache; anything else is fetched once from the configured
/// base URL and remembered.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio_system::probe;
use crate::audio_system::source::{SILENCE_ASSET, SILENCE_CLIP_LENGTH};
use crate::config::EngineSettings;
use crate::error::AssetError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Ensures a named asset is present locally
pub trait AssetResolver: Send + Sync {
    /// Idempotent; repeated calls for the same name are cheap
    fn resolve(&self, name: &str) -> Result<PathBuf, AssetError>;
}

fn validate_name(name: &str) -> Result<(), AssetError> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.');
    if invalid {
        return Err(AssetError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Disk-backed resolver with download-once caching
pub struct CachedAssetResolver {
    bundled_dir: PathBuf,
    cache_dir: PathBuf,
    base_url: Option<String>,
    resolved: Mutex<HashMap<String, PathBuf>>,
    next_partial: AtomicU64,
}

impl CachedAssetResolver {
    pub fn new(bundled_dir: PathBuf, cache_dir: PathBuf, base_url: Option<String>) -> Self {
        Self {
            bundled_dir,
            cache_dir,
            base_url,
            resolved: Mutex::new(HashMap::new()),
            next_partial: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            settings.assets_dir.clone(),
            settings.cache_dir.clone(),
            settings.download_base_url.clone(),
        )
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        [self.bundled_dir.join(name), self.cache_dir.join(name)]
            .into_iter()
            .find(|path| path.is_file())
    }

    fn store_err(&self, name: &str, path: &Path, source: io::Error) -> AssetError {
        AssetError::StoreFailed {
            name: name.to_string(),
            path: path.display().to_string(),
            source,
        }
    }

    /// Unique scratch file per write, so concurrent resolves never share one
    fn partial_path(&self, name: &str) -> PathBuf {
        let seq = self.next_partial.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!("{}.{}-{}.part", name, std::process::id(), seq))
    }

    fn generate_silence(&self) -> Result<PathBuf, AssetError> {
        let target = self.cache_dir.join(SILENCE_ASSET);
        let partial = self.partial_path(SILENCE_ASSET);
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| self.store_err(SILENCE_ASSET, &self.cache_dir, e))?;

        probe::write_silence(&partial, SILENCE_CLIP_LENGTH).map_err(|e| {
            let _ = fs::remove_file(&partial);
            self.store_err(SILENCE_ASSET, &partial, io::Error::new(io::ErrorKind::Other, e))
        })?;
        fs::rename(&partial, &target).map_err(|e| self.store_err(SILENCE_ASSET, &target, e))?;

        tracing::info!("Generated silence clip at {}", target.display());
        Ok(target)
    }

    fn download(&self, name: &str, base_url: &str) -> Result<PathBuf, AssetError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), name);
        let target = self.cache_dir.join(name);
        let partial = self.partial_path(name);

        tracing::info!("Downloading {} from {}", name, url);

        let user_agent = format!("MeditationAudio/{}", env!("CARGO_PKG_VERSION"));
        let response = ureq::get(&url)
            .set("User-Agent", &user_agent)
            .timeout(DOWNLOAD_TIMEOUT)
            .call()
            .map_err(|e| AssetError::DownloadFailed {
                name: name.to_string(),
                url: url.clone(),
                source: e.to_string().into(),
            })?;

        fs::create_dir_all(&self.cache_dir).map_err(|e| self.store_err(name, &self.cache_dir, e))?;

        let mut file = File::create(&partial).map_err(|e| self.store_err(name, &partial, e))?;
        io::copy(&mut response.into_reader(), &mut file).map_err(|e| {
            let _ = fs::remove_file(&partial);
            AssetError::DownloadFailed {
                name: name.to_string(),
                url: url.clone(),
                source: Box::new(e),
            }
        })?;
        drop(file);

        // Only complete downloads ever carry the real name
        fs::rename(&partial, &target).map_err(|e| self.store_err(name, &target, e))?;

        tracing::info!("Cached {} at {}", name, target.display());
        Ok(target)
    }
}

impl AssetResolver for CachedAssetResolver {
    fn resolve(&self, name: &str) -> Result<PathBuf, AssetError> {
        validate_name(name)?;

        if let Some(path) = self.resolved.lock().get(name) {
            return Ok(path.clone());
        }

        // Not holding the cache lock here: downloads for different names may overlap
        let path = match self.locate(name) {
            Some(path) => path,
            None if name == SILENCE_ASSET => self.generate_silence()?,
            None => match self.base_url.as_deref() {
                Some(base_url) => self.download(name, base_url)?,
                None => return Err(AssetError::NotFound(name.to_string())),
            },
        };

        self.resolved.lock().insert(name.to_string(), path.clone());
        Ok(path)
    }
}

/// Resolver that maps every name under a root without touching the disk.
///
/// Used for dry runs and tests; individual names can be made to fail.
pub struct PassthroughResolver {
    root: PathBuf,
    missing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl PassthroughResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            missing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every later resolution of `name` fail
    pub fn fail(&self, name: &str) {
        self.missing.lock().insert(name.to_string());
    }

    pub fn resolve_count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.as_str() == name).count()
    }
}

impl AssetResolver for PassthroughResolver {
    fn resolve(&self, name: &str) -> Result<PathBuf, AssetError> {
        validate_name(name)?;
        self.calls.lock().push(name.to_string());

        if self.missing.lock().contains(name) {
            return Err(AssetError::NotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_dirs(tag: &str) -> (PathBuf, PathBuf) {
        let root = std::env::temp_dir().join(format!("assets-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let bundled = root.join("bundled");
        let cache = root.join("cache");
        fs::create_dir_all(&bundled).unwrap();
        (bundled, cache)
    }

    #[test]
    fn test_bundled_asset_resolves_and_is_memoised() {
        let (bundled, cache) = temp_dirs("bundled");
        let file = bundled.join("bell.mp3");
        fs::write(&file, b"not really audio").unwrap();

        let resolver = CachedAssetResolver::new(bundled.clone(), cache, None);
        assert_eq!(resolver.resolve("bell.mp3").unwrap(), file);

        // Still answered from the cache once the lookup succeeded
        fs::remove_file(&file).unwrap();
        assert_eq!(resolver.resolve("bell.mp3").unwrap(), file);

        let _ = fs::remove_dir_all(bundled.parent().unwrap());
    }

    #[test]
    fn test_missing_asset_without_download_url() {
        let (bundled, cache) = temp_dirs("missing");
        let resolver = CachedAssetResolver::new(bundled.clone(), cache, None);

        assert!(matches!(
            resolver.resolve("ambiance_rain.mp3"),
            Err(AssetError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(bundled.parent().unwrap());
    }

    #[test]
    fn test_silence_is_generated_into_cache() {
        let (bundled, cache) = temp_dirs("silence");
        let resolver = CachedAssetResolver::new(bundled.clone(), cache.clone(), None);

        let path = resolver.resolve(SILENCE_ASSET).unwrap();
        assert_eq!(path, cache.join(SILENCE_ASSET));
        assert!(path.is_file());

        let length = probe::clip_length(&path).unwrap();
        assert!((length.as_secs_f64() - SILENCE_CLIP_LENGTH.as_secs_f64()).abs() < 0.01);

        let _ = fs::remove_dir_all(bundled.parent().unwrap());
    }

    #[test]
    fn test_concurrent_resolves_publish_complete_files() {
        let (bundled, cache) = temp_dirs("concurrent");
        let resolver = Arc::new(CachedAssetResolver::new(bundled.clone(), cache.clone(), None));

        let workers: Vec<_> = (0..6)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve(SILENCE_ASSET))
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap().unwrap(), cache.join(SILENCE_ASSET));
        }

        let length = probe::clip_length(&cache.join(SILENCE_ASSET)).unwrap();
        assert!((length.as_secs_f64() - SILENCE_CLIP_LENGTH.as_secs_f64()).abs() < 0.01);
        let leftovers = fs::read_dir(&cache)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);

        let a = resolver.partial_path("ambiance_rain.mp3");
        let b = resolver.partial_path("ambiance_rain.mp3");
        assert_ne!(a, b);

        let _ = fs::remove_dir_all(bundled.parent().unwrap());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let resolver = PassthroughResolver::new("/sounds");
        assert!(matches!(resolver.resolve("../etc/passwd"), Err(AssetError::InvalidName(_))));
        assert!(matches!(resolver.resolve(""), Err(AssetError::InvalidName(_))));
    }

    #[test]
    fn test_passthrough_failure_injection() {
        let resolver = PassthroughResolver::new("/sounds");
        assert_eq!(resolver.resolve("bell.mp3").unwrap(), PathBuf::from("/sounds/bell.mp3"));

        resolver.fail("bell.mp3");
        assert!(resolver.resolve("bell.mp3").is_err());
        assert_eq!(resolver.resolve_count("bell.mp3"), 2);
    }
}
