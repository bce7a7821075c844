/// Player primitive
///
/// The engine only needs load / play / set volume / stop / release from the
/// platform. `RodioBackend` provides them on real hardware.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::probe;
use crate::error::AudioError;

/// One loaded audio resource owned by a player handle
pub trait PlaybackSink: Send {
    fn play(&mut self);

    /// Volume in 0.0..=1.0
    fn set_volume(&mut self, volume: f32);

    fn stop(&mut self);

    /// True once playback has run to the end (or was stopped)
    fn is_finished(&self) -> bool;

    /// Decoded clip length, when the format reports it
    fn duration(&self) -> Option<Duration>;

    /// Free the resource. Consumes the sink so it can only happen once.
    fn release(self: Box<Self>);
}

/// Factory for playback sinks
pub trait AudioBackend: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn PlaybackSink>, AudioError>;
}

/// rodio-backed output.
///
/// `OutputStream` must stay on the thread that opened it, so a small thread
/// owns it for the backend's lifetime; sinks only need the handle.
pub struct RodioBackend {
    stream_handle: OutputStreamHandle,
    _keepalive: Sender<()>,
}

impl RodioBackend {
    /// Open the default output device
    pub fn try_default() -> Result<Self, AudioError> {
        let (handle_tx, handle_rx) = bounded(1);
        let (keepalive_tx, keepalive_rx) = bounded::<()>(0);

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Blocks until the backend (and its sender) is dropped
                    let _ = keepalive_rx.recv();
                    drop(stream);
                    tracing::debug!("Audio output stream closed");
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;

        let stream_handle = handle_rx
            .recv()
            .map_err(|_| AudioError::StreamClosed)?
            .map_err(|e| AudioError::StreamInitFailed(e.into()))?;

        tracing::info!("Audio output stream initialized");

        Ok(Self {
            stream_handle,
            _keepalive: keepalive_tx,
        })
    }
}

impl AudioBackend for RodioBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn PlaybackSink>, AudioError> {
        // Read entire audio file into memory
        let audio_data = fs::read(path).map_err(|e| AudioError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        tracing::debug!("Preloaded audio file: {} ({} bytes)", path.display(), audio_data.len());

        let decoder = Decoder::new(Cursor::new(audio_data))
            .map_err(|e| AudioError::DecodeFailed(e.to_string().into()))?;
        let duration = probe::clip_length(path).or_else(|| decoder.total_duration());

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| AudioError::StreamInitFailed(e.to_string().into()))?;
        sink.pause();
        sink.append(decoder);

        Ok(Box::new(RodioSink { sink, duration }))
    }
}

struct RodioSink {
    sink: Sink,
    duration: Option<Duration>,
}

impl PlaybackSink for RodioSink {
    fn play(&mut self) {
        self.sink.play();
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn stop(&mut self) {
        self.sink.stop();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn release(self: Box<Self>) {
        self.sink.stop();
    }
}
