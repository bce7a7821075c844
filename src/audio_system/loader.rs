/// Off-loop clip loading
///
/// Resolving (possibly downloading) and decoding a clip happens on a blocking
/// worker; the result is handed back on the timer loop. Continuations must
/// check their owner's generation before using the handle; a stale handle is
/// simply dropped, which releases it.

use std::sync::Arc;
use std::time::Duration;

use super::backend::AudioBackend;
use super::player::AudioPlayerHandle;
use super::source::AudioSourceType;
use crate::assets::AssetResolver;
use crate::error::PlaybackError;
use crate::scheduling::Scheduler;

pub type LoadResult = Result<AudioPlayerHandle, PlaybackError>;

#[derive(Clone)]
pub struct ClipLoader {
    scheduler: Arc<dyn Scheduler>,
    backend: Arc<dyn AudioBackend>,
    resolver: Arc<dyn AssetResolver>,
}

impl ClipLoader {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        backend: Arc<dyn AudioBackend>,
        resolver: Arc<dyn AssetResolver>,
    ) -> Self {
        Self {
            scheduler,
            backend,
            resolver,
        }
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Resolve and load `asset`, then run `done` on the timer loop
    pub fn load_async<F>(&self, source_type: AudioSourceType, asset: String, done: F)
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        let scheduler = Arc::clone(&self.scheduler);
        let backend = Arc::clone(&self.backend);
        let resolver = Arc::clone(&self.resolver);

        self.scheduler.spawn_blocking(Box::new(move || {
            let result = resolver
                .resolve(&asset)
                .map_err(PlaybackError::from)
                .and_then(|path| {
                    AudioPlayerHandle::load(backend.as_ref(), source_type, &path)
                        .map_err(PlaybackError::from)
                });

            scheduler.schedule(Duration::ZERO, Box::new(move || done(result)));
        }));
    }

    /// Make sure `assets` are local, then run `done` on the timer loop.
    /// Failures are logged; playback retries resolution later anyway.
    pub fn prefetch<F>(&self, assets: Vec<String>, done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let scheduler = Arc::clone(&self.scheduler);
        let resolver = Arc::clone(&self.resolver);

        self.scheduler.spawn_blocking(Box::new(move || {
            for asset in &assets {
                match resolver.resolve(asset) {
                    Ok(path) => tracing::debug!("Prefetched {} -> {}", asset, path.display()),
                    Err(e) => tracing::warn!("Prefetch of {} failed: {}", asset, e),
                }
            }

            scheduler.schedule(Duration::ZERO, Box::new(done));
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PassthroughResolver;
    use crate::audio_system::RecordingBackend;
    use crate::scheduling::ManualScheduler;
    use parking_lot::Mutex;

    #[test]
    fn test_result_delivered_on_loop() {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = Arc::new(RecordingBackend::new(scheduler.clone()));
        let resolver = Arc::new(PassthroughResolver::new("/sounds"));
        let loader = ClipLoader::new(scheduler.clone(), backend.clone(), resolver);

        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);
        loader.load_async(AudioSourceType::Bell, "bell.mp3".to_string(), move |result| {
            *slot.lock() = Some(result.map(|handle| handle.name().to_string()).ok());
        });

        // Loaded already, but the continuation waits for the loop
        assert_eq!(backend.load_attempts("bell.mp3"), 1);
        assert!(delivered.lock().is_none());

        scheduler.advance(Duration::ZERO);
        assert_eq!(*delivered.lock(), Some(Some("bell.mp3".to_string())));
    }

    #[test]
    fn test_resolution_failure_skips_decode() {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = Arc::new(RecordingBackend::new(scheduler.clone()));
        let resolver = Arc::new(PassthroughResolver::new("/sounds"));
        resolver.fail("voice.mp3");
        let loader = ClipLoader::new(scheduler.clone(), backend.clone(), resolver);

        let failed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&failed);
        loader.load_async(AudioSourceType::Guidance, "voice.mp3".to_string(), move |result| {
            *flag.lock() = matches!(result, Err(PlaybackError::Asset(_)));
        });
        scheduler.advance(Duration::ZERO);

        assert!(*failed.lock());
        assert_eq!(backend.load_attempts("voice.mp3"), 0);
    }
}
