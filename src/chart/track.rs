use serde::{Deserialize, Serialize};

use crate::chart::sync::SyncTrack;
use crate::error::{Error, Result};

/// Index of a note inside the `NoteTrack` that owns it.
///
/// Ids are only meaningful for the track they came from; rebuilding the
/// track (practice slicing) invalidates all of them.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NoteId(pub usize);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Note {
    /// Semitone pitch, MIDI numbering.
    pub pitch: f32,
    #[serde(default)]
    pub non_pitched: bool,
    pub tick: u32,
    /// Exclusive.
    pub tick_end: u32,
    /// Index into `NoteTrack::phrases`.
    pub phrase: usize,
    #[serde(default, skip_deserializing)]
    pub previous: Option<NoteId>,
    #[serde(default, skip_deserializing)]
    pub next: Option<NoteId>,
}

impl Note {
    pub fn new(pitch: f32, tick: u32, tick_end: u32, phrase: usize) -> Self {
        Note {
            pitch,
            non_pitched: false,
            tick,
            tick_end,
            phrase,
            previous: None,
            next: None,
        }
    }

    pub fn non_pitched(tick: u32, tick_end: u32, phrase: usize) -> Self {
        Note {
            non_pitched: true,
            ..Note::new(0.0, tick, tick_end, phrase)
        }
    }

    pub fn length(&self) -> u32 {
        self.tick_end - self.tick
    }

    pub fn contains(&self, tick: u32) -> bool {
        tick >= self.tick && tick < self.tick_end
    }

    /// Ticks of `[start, end)` that fall inside this note.
    pub fn overlap(&self, start: u32, end: u32) -> u32 {
        let lo = start.max(self.tick);
        let hi = end.min(self.tick_end);
        hi.saturating_sub(lo)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Phrase {
    pub tick: u32,
    pub tick_end: u32,
    #[serde(default)]
    pub star_power: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TextEvent {
    pub tick: u32,
    pub text: String,
}

/// Raw track data as it arrives from a chart loader or a JS host.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TrackData {
    pub notes: Vec<Note>,
    pub phrases: Vec<Phrase>,
    #[serde(default)]
    pub text_events: Vec<TextEvent>,
    #[serde(default)]
    pub sync: SyncTrack,
}

/// Ordered, non-overlapping vocal notes for one part, with phrase and
/// lyric metadata.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NoteTrack {
    notes: Vec<Note>,
    phrases: Vec<Phrase>,
    text_events: Vec<TextEvent>,
    sync: SyncTrack,
}

impl NoteTrack {
    pub fn new(
        notes: Vec<Note>,
        phrases: Vec<Phrase>,
        text_events: Vec<TextEvent>,
        sync: SyncTrack,
    ) -> Result<Self> {
        for (i, note) in notes.iter().enumerate() {
            if note.tick_end < note.tick {
                return Err(Error::InvalidTrack(format!(
                    "note {} ends before it starts ({} < {})",
                    i, note.tick_end, note.tick
                )));
            }
            if note.phrase >= phrases.len() {
                return Err(Error::InvalidTrack(format!(
                    "note {} references missing phrase {}",
                    i, note.phrase
                )));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &notes[p]) {
                if note.tick < prev.tick_end {
                    return Err(Error::InvalidTrack(format!(
                        "note {} at tick {} overlaps the previous note ending at {}",
                        i, note.tick, prev.tick_end
                    )));
                }
                if note.phrase < prev.phrase {
                    return Err(Error::InvalidTrack(format!(
                        "note {} goes back to phrase {}",
                        i, note.phrase
                    )));
                }
            }
        }

        let sync = SyncTrack::new(sync.resolution, sync.tempos)?;
        let mut track = NoteTrack {
            notes,
            phrases,
            text_events,
            sync,
        };
        track.link_neighbours();
        Ok(track)
    }

    pub fn from_data(data: TrackData) -> Result<Self> {
        Self::new(data.notes, data.phrases, data.text_events, data.sync)
    }

    fn link_neighbours(&mut self) {
        let count = self.notes.len();
        for (i, note) in self.notes.iter_mut().enumerate() {
            note.previous = i.checked_sub(1).map(NoteId);
            note.next = if i + 1 < count { Some(NoteId(i + 1)) } else { None };
        }
    }

    /// Builds the practice copy holding notes with `start <= tick < end`.
    ///
    /// Phrases, lyrics and tempo map are carried over unchanged; neighbour
    /// links are rebuilt inside the slice only.
    pub fn slice(&self, start: u32, end: u32) -> NoteTrack {
        let notes: Vec<Note> = self
            .notes
            .iter()
            .filter(|n| n.tick >= start && n.tick < end)
            .cloned()
            .collect();

        let mut track = NoteTrack {
            notes,
            phrases: self.phrases.clone(),
            text_events: self.text_events.clone(),
            sync: self.sync.clone(),
        };
        track.link_neighbours();
        track.clear_boundary_links();
        track
    }

    /// Drops the outward links of the first and last notes.
    pub fn clear_boundary_links(&mut self) {
        if let Some(first) = self.notes.first_mut() {
            first.previous = None;
        }
        if let Some(last) = self.notes.last_mut() {
            last.next = None;
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(id.0)
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn text_events(&self) -> &[TextEvent] {
        &self.text_events
    }

    pub fn sync(&self) -> &SyncTrack {
        &self.sync
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn last_tick(&self) -> u32 {
        self.notes.last().map_or(0, |n| n.tick_end)
    }
}
