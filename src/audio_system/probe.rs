use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Sample rate of the generated silence clip
const SILENCE_SAMPLE_RATE: u32 = 22_050;

/// Read the length of an audio file from its container headers.
///
/// Returns `None` when the format does not carry a frame count (common for
/// VBR MP3 without a Xing header); callers fall back to the authored length.
pub fn clip_length(path: &Path) -> Option<Duration> {
    let src = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!("Cannot open {} for probing: {}", path.display(), e);
            return None;
        }
    };
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    // Create a probe hint using the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = match symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts) {
        Ok(probed) => probed,
        Err(e) => {
            tracing::debug!("Cannot probe {}: {}", path.display(), e);
            return None;
        }
    };

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)?;

    let frames = track.codec_params.n_frames?;
    let sample_rate = track.codec_params.sample_rate?;
    if sample_rate == 0 {
        return None;
    }

    Some(Duration::from_secs_f64(frames as f64 / f64::from(sample_rate)))
}

/// Write a mono 16-bit silent WAV of the given length
pub fn write_silence(path: &Path, length: Duration) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SILENCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = (length.as_secs_f64() * f64::from(SILENCE_SAMPLE_RATE)).round() as u64;
    for _ in 0..frames {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;

    Ok(())
}
