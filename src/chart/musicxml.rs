//! MusicXML import for vocal charts.
//!
//! Only the first `<part>` of a partwise score is read, and only its first
//! voice. Rests close the running phrase, tied notes are merged, lyrics
//! become text events and `<unpitched>` notes become non-pitched notes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::chart::sync::{SyncTrack, TempoChange, DEFAULT_RESOLUTION};
use crate::chart::track::{Note, NoteTrack, Phrase, TextEvent};
use crate::error::{Error, Result};

pub fn midi_from_pitch(step: char, alter: f32, octave: i32) -> Result<f32> {
    let base = match step.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        other => return Err(Error::Parse(format!("unknown pitch step '{}'", other))),
    };
    Ok(((octave + 1) * 12 + base) as f32 + alter)
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| std::str::from_utf8(&a.value).ok().map(str::to_string))
}

#[derive(Default)]
struct PendingNote {
    rest: bool,
    chord: bool,
    grace: bool,
    unpitched: bool,
    tie_stop: bool,
    duration: Option<f64>,
    step: Option<char>,
    alter: f32,
    octave: Option<i32>,
    voice: Option<String>,
    syllabic: Option<String>,
    lyric: Option<String>,
}

#[derive(Default)]
struct TrackBuilder {
    notes: Vec<Note>,
    phrases: Vec<Phrase>,
    text_events: Vec<TextEvent>,
    tempos: Vec<TempoChange>,
    open_phrase: Option<usize>,
}

impl TrackBuilder {
    fn set_tempo(&mut self, tick: u32, bpm: f64) {
        if !(bpm > 0.0) || !bpm.is_finite() {
            log::warn!("MUSICXML: Ignoring tempo {} at tick {}", bpm, tick);
            return;
        }
        match self.tempos.last_mut() {
            Some(last) if last.tick == tick => last.bpm = bpm,
            _ => self.tempos.push(TempoChange { tick, bpm }),
        }
    }

    fn close_phrase(&mut self) {
        self.open_phrase = None;
    }

    /// Appends a note, or extends the previous one when `tie_stop` continues it.
    fn push_note(&mut self, pitch: Option<f32>, tick: u32, tick_end: u32, tie_stop: bool) -> bool {
        if tie_stop {
            if let Some(last) = self.notes.last_mut() {
                let same_pitch = match pitch {
                    Some(p) => !last.non_pitched && last.pitch == p,
                    None => last.non_pitched,
                };
                if same_pitch && last.tick_end == tick {
                    last.tick_end = tick_end;
                    if let Some(phrase) = self.open_phrase.and_then(|i| self.phrases.get_mut(i)) {
                        phrase.tick_end = tick_end;
                    }
                    return false;
                }
            }
        }

        let phrase = match self.open_phrase {
            Some(i) => i,
            None => {
                self.phrases.push(Phrase {
                    tick,
                    tick_end,
                    star_power: false,
                });
                let i = self.phrases.len() - 1;
                self.open_phrase = Some(i);
                i
            }
        };
        self.phrases[phrase].tick_end = tick_end;

        self.notes.push(match pitch {
            Some(p) => Note::new(p, tick, tick_end, phrase),
            None => Note::non_pitched(tick, tick_end, phrase),
        });
        true
    }

    fn finish(self) -> Result<NoteTrack> {
        let sync = if self.tempos.is_empty() {
            SyncTrack::default()
        } else {
            SyncTrack::new(DEFAULT_RESOLUTION, self.tempos)?
        };
        NoteTrack::new(self.notes, self.phrases, self.text_events, sync)
    }
}

fn to_ticks(divs: f64, divisions: f64) -> f64 {
    divs / divisions * DEFAULT_RESOLUTION as f64
}

/// Closes a `<note>` element and returns the playhead after it.
fn finish_note(
    builder: &mut TrackBuilder,
    n: PendingNote,
    position: f64,
    divisions: f64,
    primary_voice: &mut Option<String>,
) -> Result<f64> {
    if n.grace || n.chord {
        return Ok(position);
    }

    let start = position;
    let end = position + to_ticks(n.duration.unwrap_or(0.0), divisions);

    let voice = n.voice.clone().unwrap_or_else(|| "1".to_string());
    if *primary_voice.get_or_insert_with(|| voice.clone()) != voice {
        return Ok(end);
    }

    if n.rest {
        builder.close_phrase();
        return Ok(end);
    }

    let tick = start.round() as u32;
    let tick_end = end.round() as u32;
    let pitch = if n.unpitched {
        None
    } else {
        let step = n
            .step
            .ok_or_else(|| Error::Parse(format!("note at tick {} has no step", tick)))?;
        let octave = n
            .octave
            .ok_or_else(|| Error::Parse(format!("note at tick {} has no octave", tick)))?;
        Some(midi_from_pitch(step, n.alter, octave)?)
    };

    let added = builder.push_note(pitch, tick, tick_end, n.tie_stop);
    if let (true, Some(lyric)) = (added, n.lyric) {
        let text = match n.syllabic.as_deref() {
            Some("begin") | Some("middle") => format!("{}-", lyric),
            _ => lyric,
        };
        builder.text_events.push(TextEvent { tick, text });
    }

    Ok(end)
}

/// Builds a vocal `NoteTrack` at 480 ticks per quarter note.
pub fn parse_musicxml_track(xml: &str) -> Result<NoteTrack> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut builder = TrackBuilder::default();

    let mut divisions: f64 = 1.0;
    // Playhead in ticks; kept fractional so odd divisions do not drift.
    let mut position: f64 = 0.0;
    let mut primary_voice: Option<String> = None;

    let mut current_tag: Option<&'static str> = None;
    let mut note: Option<PendingNote> = None;
    let mut in_lyric = false;
    let mut in_skip = false;
    let mut skip_divs: f64 = 0.0;
    let mut in_part = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"part" => in_part = true,
                b"note" if in_part => note = Some(PendingNote::default()),
                b"backup" | b"forward" => {
                    in_skip = true;
                    skip_divs = 0.0;
                }
                b"unpitched" => {
                    if let Some(n) = note.as_mut() {
                        n.unpitched = true;
                    }
                }
                b"rest" => {
                    if let Some(n) = note.as_mut() {
                        n.rest = true;
                    }
                }
                b"lyric" => {
                    // Only the first verse
                    in_lyric = note.as_ref().map_or(false, |n| n.lyric.is_none());
                }
                b"sound" => {
                    if let Some(bpm) = attr_value(e, b"tempo").and_then(|v| v.parse::<f64>().ok()) {
                        builder.set_tempo(position.round() as u32, bpm);
                    }
                }
                b"divisions" => current_tag = Some("divisions"),
                b"duration" => current_tag = Some("duration"),
                b"step" => current_tag = Some("step"),
                b"alter" => current_tag = Some("alter"),
                b"octave" => current_tag = Some("octave"),
                b"voice" => current_tag = Some("voice"),
                b"per-minute" => current_tag = Some("per-minute"),
                b"syllabic" if in_lyric => current_tag = Some("syllabic"),
                b"text" if in_lyric => current_tag = Some("text"),
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"sound" => {
                    if let Some(bpm) = attr_value(e, b"tempo").and_then(|v| v.parse::<f64>().ok()) {
                        builder.set_tempo(position.round() as u32, bpm);
                    }
                }
                b"rest" | b"chord" | b"grace" | b"unpitched" | b"tie" => {
                    if let Some(n) = note.as_mut() {
                        match e.name().as_ref() {
                            b"rest" => n.rest = true,
                            b"chord" => n.chord = true,
                            b"grace" => n.grace = true,
                            b"unpitched" => n.unpitched = true,
                            _ => {
                                if attr_value(e, b"type").as_deref() == Some("stop") {
                                    n.tie_stop = true;
                                }
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if let Some(tag) = current_tag.take() {
                    let text = e.unescape()?;
                    let text = text.trim();
                    match tag {
                        "divisions" => match text.parse::<f64>() {
                            Ok(v) if v > 0.0 => divisions = v,
                            _ => {
                                return Err(Error::Parse(format!("invalid divisions '{}'", text)))
                            }
                        },
                        "per-minute" => {
                            if let Ok(bpm) = text.parse::<f64>() {
                                builder.set_tempo(position.round() as u32, bpm);
                            }
                        }
                        "duration" => {
                            let value = text
                                .parse::<f64>()
                                .map_err(|_| Error::Parse(format!("invalid duration '{}'", text)))?;
                            match note.as_mut() {
                                Some(n) => n.duration = Some(value),
                                None if in_skip => skip_divs = value,
                                None => {}
                            }
                        }
                        "step" => {
                            if let Some(n) = note.as_mut() {
                                n.step = text.chars().next();
                            }
                        }
                        "alter" => {
                            if let (Some(n), Ok(v)) = (note.as_mut(), text.parse::<f32>()) {
                                n.alter = v;
                            }
                        }
                        "octave" => {
                            if let (Some(n), Ok(v)) = (note.as_mut(), text.parse::<i32>()) {
                                n.octave = Some(v);
                            }
                        }
                        "voice" => {
                            if let Some(n) = note.as_mut() {
                                n.voice = Some(text.to_string());
                            }
                        }
                        "syllabic" => {
                            if let Some(n) = note.as_mut() {
                                n.syllabic = Some(text.to_string());
                            }
                        }
                        "text" => {
                            if let Some(n) = note.as_mut() {
                                n.lyric = Some(text.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"part" => break,
                b"lyric" => in_lyric = false,
                b"backup" => {
                    position = (position - to_ticks(skip_divs, divisions)).max(0.0);
                    in_skip = false;
                }
                b"forward" => {
                    position += to_ticks(skip_divs, divisions);
                    in_skip = false;
                }
                b"note" => {
                    if let Some(n) = note.take() {
                        position = finish_note(&mut builder, n, position, divisions, &mut primary_voice)?;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let track = builder.finish()?;
    log::info!(
        "MUSICXML: Imported {} notes in {} phrases",
        track.len(),
        track.phrases().len()
    );
    Ok(track)
}
