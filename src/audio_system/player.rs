/// Audio player handle
///
/// Owns exactly one playback sink. Once released the handle is inert: every
/// further call is a silent no-op and the sink can never be released twice.

use std::path::Path;
use std::time::Duration;

use super::backend::{AudioBackend, PlaybackSink};
use super::source::AudioSourceType;
use crate::error::AudioError;

pub struct AudioPlayerHandle {
    source_type: AudioSourceType,
    name: String,
    sink: Option<Box<dyn PlaybackSink>>,
    volume: f32,
    playing: bool,
}

impl AudioPlayerHandle {
    /// Load a resolved file through the backend
    pub fn load(
        backend: &dyn AudioBackend,
        source_type: AudioSourceType,
        path: &Path,
    ) -> Result<Self, AudioError> {
        let sink = backend.load(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        tracing::debug!("Created {} player for {}", source_type, name);

        Ok(Self {
            source_type,
            name,
            sink: Some(sink),
            volume: 1.0,
            playing: false,
        })
    }

    pub fn play(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.play();
            self.playing = true;
        }
    }

    /// Set volume (0.0-1.0)
    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = self.sink.as_mut() {
            sink.set_volume(volume);
            self.volume = volume;
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.is_finished()
    }

    /// Released handles count as finished
    pub fn is_finished(&self) -> bool {
        self.sink.as_ref().map(|sink| sink.is_finished()).unwrap_or(true)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.sink.as_ref().and_then(|sink| sink.duration())
    }

    pub fn is_released(&self) -> bool {
        self.sink.is_none()
    }

    /// Stop playback and free the resource. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.stop();
            sink.release();
            self.playing = false;
            tracing::debug!("Released {} player for {}", self.source_type, self.name);
        }
    }

    pub fn source_type(&self) -> AudioSourceType {
        self.source_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for AudioPlayerHandle {
    fn drop(&mut self) {
        self.release();
    }
}
