/// Static cue tables
///
/// Session length in minutes maps to a fixed, ordered list of offsets. Lengths
/// without a table get no cues.
use super::{Cue, CueScheduleEntry};
use crate::config::{GuidanceLevel, SessionConfig};

/// Seconds before the end at which the closing double bell strikes
pub const END_BELL_LEAD_SECS: u32 = 5;

/// Interval bells for bell-only sessions
const BELL_OFFSETS: &[(u32, &[u32])] = &[
    (5, &[90, 210]),
    (10, &[180, 420]),
    (15, &[300, 600]),
    (20, &[300, 600, 900]),
    (30, &[480, 960, 1440]),
    (45, &[600, 1200, 1800, 2400]),
    (60, &[900, 1800, 2700]),
];

/// Sparse voice cues for gentle guidance
const GENTLE_SCRIPT: &[(u32, &[(u32, &str)])] = &[
    (
        5,
        &[(0, "guide_arrive"), (60, "guide_breath"), (180, "guide_wander"), (270, "guide_close")],
    ),
    (
        10,
        &[
            (0, "guide_arrive"),
            (90, "guide_breath"),
            (240, "guide_body"),
            (420, "guide_wander"),
            (540, "guide_close"),
        ],
    ),
    (
        15,
        &[
            (0, "guide_arrive"),
            (120, "guide_breath"),
            (360, "guide_body"),
            (600, "guide_wander"),
            (840, "guide_close"),
        ],
    ),
    (
        20,
        &[
            (0, "guide_arrive"),
            (120, "guide_breath"),
            (420, "guide_body"),
            (780, "guide_wander"),
            (1080, "guide_return"),
            (1140, "guide_close"),
        ],
    ),
    (
        30,
        &[
            (0, "guide_arrive"),
            (180, "guide_breath"),
            (600, "guide_body"),
            (1080, "guide_wander"),
            (1500, "guide_return"),
            (1740, "guide_close"),
        ],
    ),
    (
        45,
        &[
            (0, "guide_arrive"),
            (240, "guide_breath"),
            (900, "guide_body"),
            (1620, "guide_wander"),
            (2280, "guide_return"),
            (2640, "guide_close"),
        ],
    ),
    (
        60,
        &[
            (0, "guide_arrive"),
            (300, "guide_breath"),
            (1200, "guide_body"),
            (2100, "guide_wander"),
            (3000, "guide_return"),
            (3540, "guide_close"),
        ],
    ),
];

/// Clip rotation for continuous guidance, one clip per interval
const CONTINUOUS_SCRIPT: &[&str] = &[
    "guide_arrive",
    "guide_settle",
    "guide_breath",
    "guide_breath_count",
    "guide_body",
    "guide_body_scan",
    "guide_sounds",
    "guide_wander",
    "guide_return",
    "guide_kindness",
];

/// Spacing of continuous guidance cues
const CONTINUOUS_INTERVAL_SECS: u32 = 60;

fn has_table(duration_minutes: u32) -> bool {
    BELL_OFFSETS.iter().any(|(minutes, _)| *minutes == duration_minutes)
}

/// Interval bells plus the optional closing double bell
pub fn bell_schedule(config: &SessionConfig) -> Vec<CueScheduleEntry> {
    let mut entries = Vec::new();

    if config.bells_enabled && config.guidance_level == GuidanceLevel::BellOnly {
        if let Some((_, offsets)) = BELL_OFFSETS
            .iter()
            .find(|(minutes, _)| *minutes == config.duration_minutes)
        {
            entries.extend(
                offsets
                    .iter()
                    .map(|offset| CueScheduleEntry::new(*offset, Cue::Bell { double: false })),
            );
        }
    }

    let wants_end_bell = config.end_double_bell
        && config.guidance_level <= GuidanceLevel::BellOnly
        && config.sound.is_silence()
        && config.total_seconds() > END_BELL_LEAD_SECS;
    if wants_end_bell {
        entries.push(CueScheduleEntry::new(
            config.total_seconds() - END_BELL_LEAD_SECS,
            Cue::Bell { double: true },
        ));
    }

    entries.sort_by_key(|entry| entry.offset_seconds);
    entries
}

/// Voice cues for gentle or continuous guidance
pub fn guidance_schedule(config: &SessionConfig) -> Vec<CueScheduleEntry> {
    match config.guidance_level {
        GuidanceLevel::Gentle => GENTLE_SCRIPT
            .iter()
            .find(|(minutes, _)| *minutes == config.duration_minutes)
            .map(|(_, script)| {
                script
                    .iter()
                    .map(|(offset, clip)| CueScheduleEntry::new(*offset, Cue::guidance(clip)))
                    .collect()
            })
            .unwrap_or_default(),
        GuidanceLevel::Continuous if has_table(config.duration_minutes) => {
            continuous_schedule(config.total_seconds())
        }
        _ => Vec::new(),
    }
}

fn continuous_schedule(total_seconds: u32) -> Vec<CueScheduleEntry> {
    let closing_at = total_seconds.saturating_sub(CONTINUOUS_INTERVAL_SECS);

    let mut entries: Vec<CueScheduleEntry> = (0..closing_at)
        .step_by(CONTINUOUS_INTERVAL_SECS as usize)
        .enumerate()
        .map(|(index, offset)| {
            let clip = CONTINUOUS_SCRIPT[index % CONTINUOUS_SCRIPT.len()];
            CueScheduleEntry::new(offset, Cue::guidance(clip))
        })
        .collect();

    entries.push(CueScheduleEntry::new(closing_at, Cue::guidance("guide_close")));
    entries
}

/// Assets worth resolving before the session starts
pub fn prefetch_assets(bells: &[CueScheduleEntry], guidance: &[CueScheduleEntry], count: usize) -> Vec<String> {
    let mut assets: Vec<String> = guidance.iter().take(count).map(|e| e.cue.asset_name()).collect();
    if let Some(bell) = bells.first() {
        assets.push(bell.cue.asset_name());
    }
    assets.dedup();
    assets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::AmbianceSound;

    fn config(minutes: u32, level: GuidanceLevel) -> SessionConfig {
        SessionConfig {
            duration_minutes: minutes,
            guidance_level: level,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_ten_minute_bell_only() {
        let entries = bell_schedule(&config(10, GuidanceLevel::BellOnly));
        let offsets: Vec<u32> = entries.iter().map(|e| e.offset_seconds).collect();
        assert_eq!(offsets, vec![180, 420]);
        assert!(guidance_schedule(&config(10, GuidanceLevel::BellOnly)).is_empty());
    }

    #[test]
    fn test_end_double_bell_in_silence() {
        let cfg = SessionConfig {
            end_double_bell: true,
            sound: AmbianceSound::None,
            ..config(10, GuidanceLevel::BellOnly)
        };
        let entries = bell_schedule(&cfg);

        assert_eq!(entries.len(), 3);
        let last = entries.last().unwrap();
        assert_eq!(last.offset_seconds, 595);
        assert_eq!(last.cue, Cue::Bell { double: true });
    }

    #[test]
    fn test_end_double_bell_needs_silence_and_low_guidance() {
        let with_sound = SessionConfig {
            end_double_bell: true,
            sound: AmbianceSound::Rain,
            ..config(10, GuidanceLevel::BellOnly)
        };
        assert!(bell_schedule(&with_sound).iter().all(|e| e.cue == Cue::Bell { double: false }));

        let with_voice = SessionConfig {
            end_double_bell: true,
            ..config(10, GuidanceLevel::Gentle)
        };
        assert!(bell_schedule(&with_voice).is_empty());

        let no_guidance = SessionConfig {
            end_double_bell: true,
            ..config(10, GuidanceLevel::None)
        };
        let entries = bell_schedule(&no_guidance);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset_seconds, 595);
    }

    #[test]
    fn test_bells_disabled() {
        let cfg = SessionConfig {
            bells_enabled: false,
            ..config(10, GuidanceLevel::BellOnly)
        };
        assert!(bell_schedule(&cfg).is_empty());
    }

    #[test]
    fn test_gentle_guidance_is_ordered() {
        let entries = guidance_schedule(&config(10, GuidanceLevel::Gentle));
        assert_eq!(entries.first().unwrap().offset_seconds, 0);
        assert!(entries.windows(2).all(|w| w[0].offset_seconds < w[1].offset_seconds));
        assert!(entries.iter().all(|e| e.offset_seconds < 600));
    }

    #[test]
    fn test_continuous_guidance_every_minute() {
        let entries = guidance_schedule(&config(10, GuidanceLevel::Continuous));
        let offsets: Vec<u32> = entries.iter().map(|e| e.offset_seconds).collect();
        assert_eq!(offsets, vec![0, 60, 120, 180, 240, 300, 360, 420, 480, 540]);
        assert_eq!(entries.last().unwrap().cue, Cue::guidance("guide_close"));
    }

    #[test]
    fn test_unknown_and_indefinite_durations_are_empty() {
        assert!(bell_schedule(&config(7, GuidanceLevel::BellOnly)).is_empty());
        assert!(guidance_schedule(&config(0, GuidanceLevel::Continuous)).is_empty());
        assert!(guidance_schedule(&config(7, GuidanceLevel::Gentle)).is_empty());
    }

    #[test]
    fn test_prefetch_assets() {
        let guidance = guidance_schedule(&config(10, GuidanceLevel::Gentle));
        let bells = bell_schedule(&config(10, GuidanceLevel::BellOnly));
        let assets = prefetch_assets(&bells, &guidance, 2);
        assert_eq!(assets, vec!["guide_arrive.mp3", "guide_breath.mp3", "bell.mp3"]);
    }
}
