/// Hardware-free backend
///
/// Records every player operation and models playback length against the
/// scheduler clock. Used by `--dry-run` and by the test suite.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::backend::{AudioBackend, PlaybackSink};
use crate::error::AudioError;
use crate::scheduling::Scheduler;

/// Clip length assumed for files without a configured length
pub const DEFAULT_RECORDED_LENGTH: Duration = Duration::from_secs(10);

/// Everything that happened to one loaded player
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: usize,
    pub path: PathBuf,
    pub length: Duration,
    pub volume: f32,
    pub volume_history: Vec<f32>,
    pub play_count: u32,
    pub started_at: Option<Duration>,
    pub stopped: bool,
    pub release_count: u32,
    pub released_at: Option<Duration>,
}

impl PlayerRecord {
    pub fn is_released(&self) -> bool {
        self.release_count > 0
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Recording {
    players: Vec<PlayerRecord>,
    load_attempts: Vec<PathBuf>,
    failing: Vec<String>,
    lengths: Vec<(String, Duration)>,
}

impl Recording {
    fn length_for(&self, path: &Path) -> Duration {
        let path = path.to_string_lossy();
        self.lengths
            .iter()
            .rev()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, length)| *length)
            .unwrap_or(DEFAULT_RECORDED_LENGTH)
    }
}

#[derive(Clone)]
pub struct RecordingBackend {
    clock: Arc<dyn Scheduler>,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingBackend {
    pub fn new(clock: Arc<dyn Scheduler>) -> Self {
        Self {
            clock,
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Files whose path contains `fragment` play for `length`; later calls win
    pub fn set_clip_length(&self, fragment: &str, length: Duration) {
        self.recording.lock().lengths.push((fragment.to_string(), length));
    }

    /// Loads of files whose path contains `fragment` fail with a decode error
    pub fn fail_loads_containing(&self, fragment: &str) {
        self.recording.lock().failing.push(fragment.to_string());
    }

    pub fn players(&self) -> Vec<PlayerRecord> {
        self.recording.lock().players.clone()
    }

    pub fn players_matching(&self, fragment: &str) -> Vec<PlayerRecord> {
        self.recording
            .lock()
            .players
            .iter()
            .filter(|p| p.path.to_string_lossy().contains(fragment))
            .cloned()
            .collect()
    }

    /// Loaded players that have not been released
    pub fn live_players(&self) -> Vec<PlayerRecord> {
        self.recording
            .lock()
            .players
            .iter()
            .filter(|p| !p.is_released())
            .cloned()
            .collect()
    }

    /// Load calls for matching paths, successful or not
    pub fn load_attempts(&self, fragment: &str) -> usize {
        self.recording
            .lock()
            .load_attempts
            .iter()
            .filter(|p| p.to_string_lossy().contains(fragment))
            .count()
    }
}

impl AudioBackend for RecordingBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn PlaybackSink>, AudioError> {
        let mut recording = self.recording.lock();
        recording.load_attempts.push(path.to_path_buf());

        let path_str = path.to_string_lossy();
        if recording.failing.iter().any(|f| path_str.contains(f.as_str())) {
            return Err(AudioError::DecodeFailed(
                format!("simulated decode failure for {}", path.display()).into(),
            ));
        }

        let id = recording.players.len();
        let length = recording.length_for(path);
        recording.players.push(PlayerRecord {
            id,
            path: path.to_path_buf(),
            length,
            volume: 1.0,
            volume_history: Vec::new(),
            play_count: 0,
            started_at: None,
            stopped: false,
            release_count: 0,
            released_at: None,
        });
        tracing::debug!(player = id, "Loaded {}", path.display());

        Ok(Box::new(RecordingSink {
            id,
            clock: Arc::clone(&self.clock),
            recording: Arc::clone(&self.recording),
        }))
    }
}

struct RecordingSink {
    id: usize,
    clock: Arc<dyn Scheduler>,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    fn update(&self, f: impl FnOnce(&mut PlayerRecord)) {
        if let Some(record) = self.recording.lock().players.get_mut(self.id) {
            f(record);
        }
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&mut self) {
        let now = self.clock.now();
        self.update(|record| {
            record.play_count += 1;
            record.started_at.get_or_insert(now);
            tracing::info!(player = record.id, "Playing {}", record.file_name());
        });
    }

    fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.update(|record| {
            record.volume = volume;
            record.volume_history.push(volume);
        });
    }

    fn stop(&mut self) {
        self.update(|record| record.stopped = true);
    }

    fn is_finished(&self) -> bool {
        let now = self.clock.now();
        self.recording
            .lock()
            .players
            .get(self.id)
            .map(|record| {
                record.stopped
                    || record
                        .started_at
                        .map(|start| now.saturating_sub(start) >= record.length)
                        .unwrap_or(false)
            })
            .unwrap_or(true)
    }

    fn duration(&self) -> Option<Duration> {
        self.recording.lock().players.get(self.id).map(|record| record.length)
    }

    fn release(self: Box<Self>) {
        let now = self.clock.now();
        self.update(|record| {
            record.release_count += 1;
            record.released_at = Some(now);
            tracing::info!(player = record.id, "Released {}", record.file_name());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::ManualScheduler;

    #[test]
    fn test_records_player_lifecycle() {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = RecordingBackend::new(scheduler.clone());
        backend.set_clip_length("bell", Duration::from_secs(4));

        let mut sink = backend.load(Path::new("/sounds/bell.mp3")).unwrap();
        sink.set_volume(0.5);
        sink.play();
        assert!(!sink.is_finished());

        scheduler.advance_secs(4);
        assert!(sink.is_finished());

        sink.release();
        let record = &backend.players()[0];
        assert_eq!(record.play_count, 1);
        assert_eq!(record.volume, 0.5);
        assert_eq!(record.release_count, 1);
        assert_eq!(record.released_at, Some(Duration::from_secs(4)));
        assert!(backend.live_players().is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = RecordingBackend::new(scheduler);
        backend.fail_loads_containing("broken");

        assert!(matches!(
            backend.load(Path::new("broken.mp3")),
            Err(AudioError::DecodeFailed(_))
        ));
        assert_eq!(backend.load_attempts("broken"), 1);
        assert!(backend.players().is_empty());
    }
}
