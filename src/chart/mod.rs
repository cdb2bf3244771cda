pub mod musicxml;
pub mod sync;
pub mod track;

pub use sync::{SyncTrack, TempoChange};
pub use track::{Note, NoteId, NoteTrack, Phrase, TextEvent, TrackData};
