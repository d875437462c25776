//! A single pre-composed MIDI clip tagged with a musical role.
//!
//! This mirrors the reference `CommuFile`: a two-track source file (meta +
//! music) is loaded, flattened into one track, stamped with a name/program/
//! channel, and from then on treated as an immutable value that is only ever
//! deep-cloned and time-shifted.

use std::fmt;
use std::path::Path;

use midly::Smf;

use super::event::{merge_delta_tracks, track_duration, Event, MetaEvent, Track, TrackEvent};
use crate::error::{Error, Result};

/// Musical function a sample plays in the final piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    MainMelody,
    SubMelody,
    Riff,
    Accompaniment,
    Pad,
    Bass,
}

impl Role {
    /// Resource demand this role's intervals place on the cumulative
    /// capacity constraint (see `scheduler::model`).
    pub fn demand(self) -> u32 {
        match self {
            Role::MainMelody | Role::SubMelody | Role::Riff => 3,
            Role::Accompaniment => 2,
            Role::Pad | Role::Bass => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::MainMelody => "main_melody",
            Role::SubMelody => "sub_melody",
            Role::Riff => "riff",
            Role::Accompaniment => "accompaniment",
            Role::Pad => "pad",
            Role::Bass => "bass",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "main_melody" => Ok(Role::MainMelody),
            "sub_melody" => Ok(Role::SubMelody),
            "riff" => Ok(Role::Riff),
            "accompaniment" => Ok(Role::Accompaniment),
            "pad" => Ok(Role::Pad),
            "bass" => Ok(Role::Bass),
            other => Err(Error::UnknownRole(other.to_string())),
        }
    }
}

/// A preprocessed, single-track MIDI sample.
#[derive(Debug, Clone)]
pub struct Sample {
    pub role: Role,
    pub instrument: String,
    pub channel: u8,
    pub ticks_per_beat: u16,
    pub track: Track,
}

impl Sample {
    /// Loads a two-track raw MIDI file and flattens it into a sample, but
    /// does not yet stamp name/program/channel (see [`Sample::preprocess`]).
    pub fn load(path: impl AsRef<Path>, role: Role, instrument: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let smf = Smf::parse(&bytes).map_err(|e| Error::InvalidMidi {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if smf.tracks.len() != 2 {
            return Err(Error::InvalidMidi {
                path: path.to_path_buf(),
                reason: format!("expected exactly 2 tracks, found {}", smf.tracks.len()),
            });
        }
        let meta_track: Track = smf.tracks[0].iter().map(|e| TrackEvent::from_wire(*e)).collect();
        if !is_all_meta(&meta_track) {
            return Err(Error::InvalidMidi {
                path: path.to_path_buf(),
                reason: "track 0 contains non-meta events".to_string(),
            });
        }
        let music_track: Track = smf.tracks[1].iter().map(|e| TrackEvent::from_wire(*e)).collect();

        let ticks_per_beat = match smf.header.timing {
            midly::Timing::Metrical(tpb) => tpb.as_int(),
            midly::Timing::Timecode(..) => {
                return Err(Error::InvalidMidi {
                    path: path.to_path_buf(),
                    reason: "SMPTE timecode timing is not supported".to_string(),
                })
            }
        };

        let track = merge_delta_tracks(&[meta_track, music_track]);

        Ok(Sample {
            role,
            instrument: instrument.into(),
            channel: 0,
            ticks_per_beat,
            track,
        })
    }

    /// Stamps the track name, GM program, and MIDI channel. `channel` must
    /// already have been assigned by the caller (see `catalog::sampler`,
    /// which owns the per-run channel counter).
    pub fn preprocess(mut self, channel: u8, program: u8) -> Self {
        self.channel = channel;
        self.set_name(self.role.as_str().to_string());
        self.set_program(program);
        self.set_channel(channel);
        self
    }

    fn set_name(&mut self, name: String) {
        if let Some(event) = self
            .track
            .iter_mut()
            .find(|e| matches!(e.kind, Event::Meta(MetaEvent::TrackName(_))))
        {
            event.kind = Event::Meta(MetaEvent::TrackName(name.into_bytes()));
        } else {
            self.track.insert(
                0,
                TrackEvent {
                    delta: 0,
                    kind: Event::Meta(MetaEvent::TrackName(name.into_bytes())),
                },
            );
        }
    }

    fn set_program(&mut self, program: u8) {
        for event in &mut self.track {
            if let Event::ProgramChange { program: p, .. } = &mut event.kind {
                *p = program;
            }
        }
    }

    /// Sets the channel on `program_change` and `note_on` events only;
    /// `note_off` is intentionally left untouched.
    fn set_channel(&mut self, channel: u8) {
        for event in &mut self.track {
            match &mut event.kind {
                Event::ProgramChange { channel: c, .. } => *c = channel,
                Event::NoteOn { channel: c, .. } => *c = channel,
                _ => {}
            }
        }
    }

    /// Total delta-time of the track, in MIDI ticks.
    pub fn duration(&self) -> u32 {
        track_duration(&self.track)
    }

    /// The sample's single `program_change` event's program number, or
    /// `None` if it has none (should not happen on a preprocessed sample).
    pub fn program(&self) -> Option<u8> {
        self.track.iter().find_map(|e| match e.kind {
            Event::ProgramChange { program, .. } => Some(program),
            _ => None,
        })
    }

    /// Returns a deep copy shifted by `delta` ticks: a pre-roll of silence
    /// is encoded purely as additional lead-in on the `program_change`
    /// event's delta-time, leaving every other event's timing untouched.
    pub fn shift(&self, delta: u32) -> Self {
        let mut shifted = self.clone();
        if let Some(event) = shifted
            .track
            .iter_mut()
            .find(|e| matches!(e.kind, Event::ProgramChange { .. }))
        {
            event.delta += delta;
        }
        shifted
    }
}

/// A multi-track MIDI file ready to be written to disk: the concatenation
/// of several samples' tracks, one track per sample, in order.
pub struct MultiTrackFile {
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

impl MultiTrackFile {
    /// `merge(Samples[]) -> MultiTrackFile`: concatenates each sample's
    /// single track into a new multi-track file, preserving order.
    pub fn merge(samples: &[Sample]) -> Self {
        let ticks_per_beat = samples.first().map(|s| s.ticks_per_beat).unwrap_or(480);
        MultiTrackFile {
            ticks_per_beat,
            tracks: samples.iter().map(|s| s.track.clone()).collect(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let header = midly::Header {
            format: midly::Format::Parallel,
            timing: midly::Timing::Metrical(self.ticks_per_beat.into()),
        };
        let wire_tracks: Vec<Vec<midly::TrackEvent<'static>>> = self
            .tracks
            .iter()
            .map(|track| track.iter().map(|e| e.to_wire()).collect())
            .collect();
        let smf = Smf {
            header,
            tracks: wire_tracks,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut buf = Vec::new();
        smf.write(&mut buf).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;
        std::fs::write(path, buf).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Returns `true` if every event in `track` is a meta event: the
/// `move_meta` precondition on a source file's track 0.
pub fn is_all_meta(track: &Track) -> bool {
    track.iter().all(|e| matches!(e.kind, Event::Meta(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with_track(track: Track) -> Sample {
        Sample {
            role: Role::Bass,
            instrument: "test".to_string(),
            channel: 0,
            ticks_per_beat: 480,
            track,
        }
    }

    #[test]
    fn shift_only_moves_program_change() {
        let sample = sample_with_track(vec![
            TrackEvent {
                delta: 0,
                kind: Event::ProgramChange {
                    channel: 0,
                    program: 33,
                },
            },
            TrackEvent {
                delta: 10,
                kind: Event::NoteOn {
                    channel: 0,
                    key: 40,
                    vel: 100,
                },
            },
        ]);
        let shifted = sample.shift(500);
        assert_eq!(shifted.duration(), sample.duration() + 500);
        assert_eq!(shifted.track[1].delta, 10);
    }

    #[test]
    fn set_channel_skips_note_off() {
        let mut sample = sample_with_track(vec![
            TrackEvent {
                delta: 0,
                kind: Event::ProgramChange {
                    channel: 0,
                    program: 0,
                },
            },
            TrackEvent {
                delta: 0,
                kind: Event::NoteOn {
                    channel: 0,
                    key: 60,
                    vel: 100,
                },
            },
            TrackEvent {
                delta: 10,
                kind: Event::NoteOff {
                    channel: 3,
                    key: 60,
                    vel: 0,
                },
            },
        ]);
        sample.set_channel(5);
        assert!(matches!(
            sample.track[0].kind,
            Event::ProgramChange { channel: 5, .. }
        ));
        assert!(matches!(sample.track[1].kind, Event::NoteOn { channel: 5, .. }));
        assert!(matches!(sample.track[2].kind, Event::NoteOff { channel: 3, .. }));
    }

    #[test]
    fn is_all_meta_rejects_a_channel_voice_event() {
        let meta_only = vec![TrackEvent {
            delta: 0,
            kind: Event::Meta(MetaEvent::TrackName(b"meta".to_vec())),
        }];
        assert!(is_all_meta(&meta_only));

        let mixed = vec![
            TrackEvent {
                delta: 0,
                kind: Event::Meta(MetaEvent::TrackName(b"meta".to_vec())),
            },
            TrackEvent {
                delta: 0,
                kind: Event::ProgramChange { channel: 0, program: 1 },
            },
        ];
        assert!(!is_all_meta(&mixed));
    }

    #[test]
    fn program_reports_stamped_value() {
        let mut sample = sample_with_track(vec![TrackEvent {
            delta: 0,
            kind: Event::ProgramChange {
                channel: 0,
                program: 1,
            },
        }]);
        sample.set_program(42);
        assert_eq!(sample.program(), Some(42));
    }
}
