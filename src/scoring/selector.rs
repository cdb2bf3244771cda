use crate::chart::{NoteId, NoteTrack};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub active: Option<NoteId>,
    /// Set exactly once, on the query that first lands inside a new note.
    pub changed: bool,
}

/// Finds the note under the playhead.
///
/// Sequential queries walk a cursor forward; a query behind the cursor
/// (seek, restart) falls back to a binary search.
#[derive(Clone, Debug, Default)]
pub struct TargetSelector {
    cursor: usize,
    last: Option<NoteId>,
}

impl TargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last = None;
    }

    pub fn last(&self) -> Option<NoteId> {
        self.last
    }

    pub fn select(&mut self, track: &NoteTrack, tick: u32) -> Selection {
        let notes = track.notes();

        let behind = notes
            .get(self.cursor)
            .map_or(self.cursor > 0, |n| tick < n.tick && self.cursor > 0);
        if behind {
            // First note that has not ended yet
            self.cursor = notes.partition_point(|n| n.tick_end <= tick);
        }

        while self.cursor < notes.len() && notes[self.cursor].tick_end <= tick {
            self.cursor += 1;
        }

        let active = notes
            .get(self.cursor)
            .filter(|n| n.contains(tick))
            .map(|_| NoteId(self.cursor));

        let changed = active.is_some() && active != self.last;
        if active.is_some() {
            self.last = active;
        }

        Selection { active, changed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::fixtures::ten_note_track;

    #[test]
    fn test_one_note_or_none() {
        let track = ten_note_track();
        let mut selector = TargetSelector::new();
        for tick in 0..520 {
            let selection = selector.select(&track, tick);
            let containing: Vec<usize> = track
                .notes()
                .iter()
                .enumerate()
                .filter(|(_, n)| n.contains(tick))
                .map(|(i, _)| i)
                .collect();
            assert!(containing.len() <= 1);
            assert_eq!(selection.active.map(|id| id.0), containing.first().copied());
        }
    }

    #[test]
    fn test_change_emitted_once_per_boundary() {
        let track = ten_note_track();
        let mut selector = TargetSelector::new();
        let changes: Vec<NoteId> = (0..520)
            .filter_map(|tick| {
                let s = selector.select(&track, tick);
                s.active.filter(|_| s.changed)
            })
            .collect();
        let expected: Vec<NoteId> = (0..10).map(NoteId).collect();
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_gap_keeps_last_target() {
        let track = ten_note_track();
        let mut selector = TargetSelector::new();
        selector.select(&track, 10);
        let gap = selector.select(&track, 45);
        assert_eq!(gap.active, None);
        assert!(!gap.changed);
        assert_eq!(selector.last(), Some(NoteId(0)));
    }

    #[test]
    fn test_seek_backwards() {
        let track = ten_note_track();
        let mut selector = TargetSelector::new();
        assert_eq!(selector.select(&track, 460).active, Some(NoteId(9)));
        let back = selector.select(&track, 120);
        assert_eq!(back.active, Some(NoteId(2)));
        assert!(back.changed);
    }

    #[test]
    fn test_empty_track() {
        let track = ten_note_track().slice(5000, 6000);
        let mut selector = TargetSelector::new();
        let s = selector.select(&track, 0);
        assert_eq!(s.active, None);
        assert!(!s.changed);
    }
}
