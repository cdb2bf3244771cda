use wasm_bindgen::prelude::*;

pub mod chart;
pub mod error;
pub mod pitch;
pub mod player;
pub mod scoring;
pub mod visuals;

pub use error::Error;

use chart::{NoteTrack, TrackData};
use pitch::capture::{MicCapture, PitchProducer};
use player::{PlayerConfig, VocalsPlayer};

use serde::Serialize;
use std::cell::RefCell;

/// The browser host runs one vocals session at a time.
struct Session {
    player: VocalsPlayer,
    producer: PitchProducer,
}

thread_local! {
    static DETECTOR: RefCell<Option<pitch::yin::PitchDetector>> = RefCell::new(None);
    static SESSION: RefCell<Option<Session>> = RefCell::new(None);
}

fn js_error(e: impl ToString) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_error)
}

fn with_session<T>(f: impl FnOnce(&mut Session) -> Result<T, JsValue>) -> Result<T, JsValue> {
    SESSION.with(|cell| match cell.borrow_mut().as_mut() {
        Some(session) => f(session),
        None => Err(JsValue::from_str("No vocals session running")),
    })
}

/// Octave-agnostic distance, returning Float64Array [distance, octave_shift].
#[wasm_bindgen]
pub fn pitch_distance(target: f32, sung: f32) -> js_sys::Float64Array {
    let (distance, shift) = pitch::distance::pitch_distance(target, sung);
    let arr = js_sys::Float64Array::new_with_length(2);
    arr.set_index(0, distance as f64);
    arr.set_index(1, shift as f64);
    arr
}

/// YIN-based pitch detection returning Float64Array [hz, confidence, midi_float].
/// Reuses a thread-local detector until the sample rate changes.
#[wasm_bindgen]
pub fn detect_pitch(samples: &[f32], sample_rate: f32) -> js_sys::Float64Array {
    let result = DETECTOR.with(|cell| {
        let mut borrow = cell.borrow_mut();
        if borrow.as_ref().map_or(true, |d| d.sample_rate() != sample_rate) {
            *borrow = Some(pitch::yin::PitchDetector::for_voice(sample_rate, 2048));
        }
        match borrow.as_mut() {
            Some(detector) => detector.detect(samples),
            None => pitch::yin::PitchResult::silence(),
        }
    });

    let arr = js_sys::Float64Array::new_with_length(3);
    arr.set_index(0, result.hz as f64);
    arr.set_index(1, result.confidence as f64);
    arr.set_index(2, result.midi_float as f64);
    arr
}

#[wasm_bindgen]
pub fn parse_musicxml_track(xml: &str) -> Result<JsValue, JsValue> {
    let track = chart::musicxml::parse_musicxml_track(xml).map_err(js_error)?;
    to_js(&track)
}

/// Starts a session over a track (as returned by `parse_musicxml_track`)
/// fed by a microphone running at `sample_rate`. Replaces any running one.
#[wasm_bindgen]
pub fn create_session(
    track_js: JsValue,
    config_js: JsValue,
    sample_rate: f32,
    start_time: f64,
) -> Result<(), JsValue> {
    let data: TrackData = serde_wasm_bindgen::from_value(track_js).map_err(js_error)?;
    let config: PlayerConfig = if config_js.is_null() || config_js.is_undefined() {
        PlayerConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config_js).map_err(js_error)?
    };

    let track = NoteTrack::from_data(data).map_err(js_error)?;
    let (capture, producer) = MicCapture::open(sample_rate, config.updates_per_second, start_time);
    let player = VocalsPlayer::new(track, config, capture).map_err(js_error)?;

    SESSION.with(|cell| {
        if let Some(mut old) = cell.replace(Some(Session { player, producer })) {
            old.player.stop();
        }
    });
    Ok(())
}

/// Feeds raw mono microphone frames. Returns how many readings were made.
#[wasm_bindgen]
pub fn push_audio(frames: &[f32]) -> Result<u32, JsValue> {
    with_session(|session| Ok(session.producer.push_audio(frames) as u32))
}

/// Runs one frame, returning `{ events, needle }`.
#[wasm_bindgen]
pub fn update_session(song_time: f64, dt: f64) -> Result<JsValue, JsValue> {
    #[derive(Serialize)]
    struct Frame {
        events: Vec<scoring::EngineEvent>,
        needle: visuals::NeedleFrame,
    }

    with_session(|session| {
        let events = session.player.update(song_time, dt);
        to_js(&Frame {
            events,
            needle: session.player.needle(),
        })
    })
}

#[wasm_bindgen]
pub fn session_stats() -> Result<JsValue, JsValue> {
    #[derive(Serialize)]
    struct Stats<'a> {
        #[serde(flatten)]
        stats: &'a scoring::EngineStats,
        stars: usize,
        base_score: u64,
        full_combo: bool,
    }

    with_session(|session| {
        let engine = session.player.engine();
        to_js(&Stats {
            stats: engine.stats(),
            stars: engine.stars(),
            base_score: engine.base_score(),
            full_combo: session.player.is_full_combo(),
        })
    })
}

#[wasm_bindgen]
pub fn session_state() -> Result<JsValue, JsValue> {
    with_session(|session| to_js(session.player.state()))
}

#[wasm_bindgen]
pub fn star_power_input() -> Result<bool, JsValue> {
    with_session(|session| Ok(session.player.star_power_input()))
}

#[wasm_bindgen]
pub fn set_practice_section(start_tick: u32, end_tick: u32) -> Result<(), JsValue> {
    with_session(|session| {
        session
            .player
            .set_practice_section(start_tick, end_tick)
            .map_err(js_error)
    })
}

#[wasm_bindgen]
pub fn reset_practice_section() -> Result<(), JsValue> {
    with_session(|session| {
        session.player.reset_practice_section();
        Ok(())
    })
}

/// Stops the microphone and drops the session. Does nothing if none is running.
#[wasm_bindgen]
pub fn stop_session() {
    SESSION.with(|cell| {
        if let Some(mut session) = cell.take() {
            session.player.stop();
        }
    });
}
