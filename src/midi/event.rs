//! Owned, allocation-backed MIDI event representation.
//!
//! [`midly`] parses zero-copy, borrowing from the byte buffer it was handed.
//! That is awkward for this crate: samples are deep-cloned and shifted long
//! after the original file bytes have gone out of scope. So events are
//! converted once at load time into the owned types below, and converted
//! back to `midly` wire types only when a piece is finally written to disk.

use midly::{MetaMessage as WireMeta, MidiMessage as WireMidi, TrackEventKind as WireKind};

/// A meta event, with the subset of message kinds this crate inspects or
/// rewrites modeled explicitly. Anything else is kept as an opaque payload
/// so round-tripping an unrecognized meta event never loses data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    TrackName(Vec<u8>),
    Tempo(u32),
    TimeSignature(u8, u8, u8, u8),
    KeySignature(i8, bool),
    EndOfTrack,
    Other(u8, Vec<u8>),
}

impl MetaEvent {
    fn from_wire(meta: WireMeta<'_>) -> Self {
        match meta {
            WireMeta::TrackName(name) => MetaEvent::TrackName(name.to_vec()),
            WireMeta::Tempo(t) => MetaEvent::Tempo(t.as_int()),
            WireMeta::TimeSignature(num, den, clocks, n32) => {
                MetaEvent::TimeSignature(num, den, clocks, n32)
            }
            WireMeta::KeySignature(sharps, minor) => MetaEvent::KeySignature(sharps, minor),
            WireMeta::EndOfTrack => MetaEvent::EndOfTrack,
            other => {
                let mut buf = Vec::new();
                let kind = meta_type_byte(&other);
                encode_meta_payload(&other, &mut buf);
                MetaEvent::Other(kind, buf)
            }
        }
    }

    fn to_wire(&self) -> WireMeta<'static> {
        match self {
            MetaEvent::TrackName(name) => WireMeta::TrackName(leak(name)),
            MetaEvent::Tempo(t) => WireMeta::Tempo((*t).into()),
            MetaEvent::TimeSignature(num, den, clocks, n32) => {
                WireMeta::TimeSignature(*num, *den, *clocks, *n32)
            }
            MetaEvent::KeySignature(sharps, minor) => WireMeta::KeySignature(*sharps, *minor),
            MetaEvent::EndOfTrack => WireMeta::EndOfTrack,
            MetaEvent::Other(_, bytes) => WireMeta::Unknown(0, leak(bytes)),
        }
    }
}

/// Placeholder used only for the `Other` fallback: we don't need the exact
/// meta type byte back (it is never inspected by this crate), just a stable
/// byte payload to carry through merges and clones.
fn meta_type_byte(_meta: &WireMeta<'_>) -> u8 {
    0x7f
}

fn encode_meta_payload(meta: &WireMeta<'_>, buf: &mut Vec<u8>) {
    if let WireMeta::Unknown(_, bytes) = meta {
        buf.extend_from_slice(bytes);
    }
}

fn leak(bytes: &[u8]) -> &'static [u8] {
    Box::leak(bytes.to_vec().into_boxed_slice())
}

/// A channel-voice or meta event, owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NoteOn { channel: u8, key: u8, vel: u8 },
    NoteOff { channel: u8, key: u8, vel: u8 },
    ProgramChange { channel: u8, program: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, bend: u16 },
    Aftertouch { channel: u8, key: u8, vel: u8 },
    ChannelAftertouch { channel: u8, vel: u8 },
    Meta(MetaEvent),
    /// SysEx or any other event kind this crate does not need to inspect.
    Other,
}

/// One entry of a MIDI track: a delta-time in ticks plus the event it gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub kind: Event,
}

/// A single MIDI track: an ordered sequence of delta-timed events.
pub type Track = Vec<TrackEvent>;

impl TrackEvent {
    pub(super) fn from_wire(raw: midly::TrackEvent<'_>) -> Self {
        let delta = raw.delta.as_int();
        let kind = match raw.kind {
            WireKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    WireMidi::NoteOn { key, vel } => Event::NoteOn {
                        channel,
                        key: key.as_int(),
                        vel: vel.as_int(),
                    },
                    WireMidi::NoteOff { key, vel } => Event::NoteOff {
                        channel,
                        key: key.as_int(),
                        vel: vel.as_int(),
                    },
                    WireMidi::ProgramChange { program } => Event::ProgramChange {
                        channel,
                        program: program.as_int(),
                    },
                    WireMidi::Controller { controller, value } => Event::Controller {
                        channel,
                        controller: controller.as_int(),
                        value: value.as_int(),
                    },
                    WireMidi::PitchBend { bend } => Event::PitchBend {
                        channel,
                        bend: bend.as_int(),
                    },
                    WireMidi::Aftertouch { key, vel } => Event::Aftertouch {
                        channel,
                        key: key.as_int(),
                        vel: vel.as_int(),
                    },
                    WireMidi::ChannelAftertouch { vel } => Event::ChannelAftertouch {
                        channel,
                        vel: vel.as_int(),
                    },
                }
            }
            WireKind::Meta(meta) => Event::Meta(MetaEvent::from_wire(meta)),
            WireKind::SysEx(_) | WireKind::Escape(_) => Event::Other,
        };
        TrackEvent { delta, kind }
    }

    pub(super) fn to_wire(&self) -> midly::TrackEvent<'static> {
        let kind = match &self.kind {
            Event::NoteOn { channel, key, vel } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::NoteOn {
                    key: (*key).into(),
                    vel: (*vel).into(),
                },
            },
            Event::NoteOff { channel, key, vel } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::NoteOff {
                    key: (*key).into(),
                    vel: (*vel).into(),
                },
            },
            Event::ProgramChange { channel, program } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::ProgramChange {
                    program: (*program).into(),
                },
            },
            Event::Controller {
                channel,
                controller,
                value,
            } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::Controller {
                    controller: (*controller).into(),
                    value: (*value).into(),
                },
            },
            Event::PitchBend { channel, bend } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::PitchBend {
                    bend: (*bend).into(),
                },
            },
            Event::Aftertouch { channel, key, vel } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::Aftertouch {
                    key: (*key).into(),
                    vel: (*vel).into(),
                },
            },
            Event::ChannelAftertouch { channel, vel } => WireKind::Midi {
                channel: (*channel).into(),
                message: WireMidi::ChannelAftertouch { vel: (*vel).into() },
            },
            Event::Meta(meta) => WireKind::Meta(meta.to_wire()),
            Event::Other => WireKind::Meta(WireMeta::EndOfTrack),
        };
        midly::TrackEvent {
            delta: self.delta.into(),
            kind,
        }
    }
}

/// Sums the delta-times of a track, i.e. its total duration in ticks.
pub fn track_duration(track: &Track) -> u32 {
    track.iter().map(|e| e.delta).sum()
}

/// Merges two delta-time tracks into one, preserving absolute event order
/// (the standard algorithm `mido.merge_tracks` and this crate's Python
/// ancestor both use): convert each track to absolute ticks, merge
/// stably by absolute time keeping first-track-first on ties, then
/// re-derive delta times. Every input track's own `end_of_track` is
/// dropped during the merge and a single one is appended at the end, the
/// same way `mido.merge_tracks` does — otherwise a track ending partway
/// through the merged output truncates everything a conformant reader
/// would play back after it.
pub fn merge_delta_tracks(tracks: &[Track]) -> Track {
    let mut timeline: Vec<(u32, usize, Event)> = Vec::new();
    for (track_idx, track) in tracks.iter().enumerate() {
        let mut t: u32 = 0;
        for event in track {
            t += event.delta;
            if matches!(event.kind, Event::Meta(MetaEvent::EndOfTrack)) {
                continue;
            }
            timeline.push((t, track_idx, event.kind.clone()));
        }
    }
    // Stable sort by absolute time; ties keep insertion order, which is
    // already track-major, matching mido's behavior of not reordering
    // same-tick events across tracks beyond their natural interleaving.
    timeline.sort_by_key(|(t, track_idx, _)| (*t, *track_idx));

    let mut merged = Vec::with_capacity(timeline.len() + 1);
    let mut prev = 0u32;
    for (t, _, kind) in timeline {
        merged.push(TrackEvent {
            delta: t - prev,
            kind,
        });
        prev = t;
    }
    merged.push(TrackEvent {
        delta: 0,
        kind: Event::Meta(MetaEvent::EndOfTrack),
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_sums_deltas() {
        let track = vec![
            TrackEvent {
                delta: 10,
                kind: Event::Other,
            },
            TrackEvent {
                delta: 20,
                kind: Event::Other,
            },
        ];
        assert_eq!(track_duration(&track), 30);
    }

    #[test]
    fn merge_preserves_absolute_order() {
        let a = vec![
            TrackEvent {
                delta: 0,
                kind: Event::Meta(MetaEvent::TrackName(b"meta".to_vec())),
            },
            TrackEvent {
                delta: 100,
                kind: Event::Meta(MetaEvent::EndOfTrack),
            },
        ];
        let b = vec![
            TrackEvent {
                delta: 50,
                kind: Event::ProgramChange {
                    channel: 0,
                    program: 1,
                },
            },
            TrackEvent {
                delta: 10,
                kind: Event::NoteOn {
                    channel: 0,
                    key: 60,
                    vel: 100,
                },
            },
        ];
        let merged = merge_delta_tracks(&[a, b]);
        // Absolute times: 0 (name), 50 (pc), 60 (note_on), 100 (eot)
        let absolute: Vec<u32> = merged
            .iter()
            .scan(0u32, |acc, e| {
                *acc += e.delta;
                Some(*acc)
            })
            .collect();
        assert_eq!(absolute, vec![0, 50, 60, 100]);
    }

    #[test]
    fn merge_drops_input_end_of_track_and_appends_exactly_one() {
        // A short meta track and a much longer music track, both ending
        // with their own `end_of_track`, as every real two-track sample
        // does. The meta track's `EndOfTrack` must not truncate the
        // merged output partway through the music track's notes.
        let meta = vec![
            TrackEvent {
                delta: 0,
                kind: Event::Meta(MetaEvent::TrackName(b"meta".to_vec())),
            },
            TrackEvent {
                delta: 0,
                kind: Event::Meta(MetaEvent::EndOfTrack),
            },
        ];
        let music = vec![
            TrackEvent {
                delta: 0,
                kind: Event::ProgramChange {
                    channel: 0,
                    program: 1,
                },
            },
            TrackEvent {
                delta: 10,
                kind: Event::NoteOn {
                    channel: 0,
                    key: 60,
                    vel: 100,
                },
            },
            TrackEvent {
                delta: 50,
                kind: Event::NoteOff {
                    channel: 0,
                    key: 60,
                    vel: 0,
                },
            },
            TrackEvent {
                delta: 0,
                kind: Event::Meta(MetaEvent::EndOfTrack),
            },
        ];
        let merged = merge_delta_tracks(&[meta, music]);

        let eot_count = merged
            .iter()
            .filter(|e| matches!(e.kind, Event::Meta(MetaEvent::EndOfTrack)))
            .count();
        assert_eq!(eot_count, 1);
        assert!(matches!(
            merged.last().unwrap().kind,
            Event::Meta(MetaEvent::EndOfTrack)
        ));
        // The note-off at absolute tick 60 must survive the merge.
        let absolute: Vec<u32> = merged
            .iter()
            .scan(0u32, |acc, e| {
                *acc += e.delta;
                Some(*acc)
            })
            .collect();
        assert_eq!(absolute, vec![0, 0, 10, 60, 60]);
    }
}
