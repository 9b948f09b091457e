//! Visemes: timestamped mouth poses that drive lip-sync.
//!
//! The synthesis service returns one [`WireViseme`] per spoken character.
//! [`parse_visemes`] turns that wire list into an ordered, well-formed
//! sequence of [`TimedAnimationEvent`]s, repairing what it can and dropping
//! what it cannot. [`estimate_visemes`] produces a rough sequence from text
//! alone for offline previews.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Milliseconds per spoken character in estimated timelines.
pub const ESTIMATED_CHAR_MS: u64 = 80;
/// Milliseconds per space in estimated timelines.
pub const ESTIMATED_SPACE_MS: u64 = 50;

/// Target facial pose: the three blend parameters the avatar rig exposes.
///
/// Every value lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlendShapes {
    pub jaw_open: f32,
    pub mouth_smile: f32,
    pub mouth_pucker: f32,
}

impl BlendShapes {
    pub const NEUTRAL: BlendShapes = BlendShapes {
        jaw_open: 0.0,
        mouth_smile: 0.0,
        mouth_pucker: 0.0,
    };

    pub const fn new(jaw_open: f32, mouth_smile: f32, mouth_pucker: f32) -> Self {
        Self {
            jaw_open,
            mouth_smile,
            mouth_pucker,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.jaw_open, self.mouth_smile, self.mouth_pucker]
    }

    pub fn from_array(values: [f32; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }

    /// Clamp every value into `[0, 1]`; non-finite values become 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self::new(
            clamp(self.jaw_open),
            clamp(self.mouth_smile),
            clamp(self.mouth_pucker),
        )
    }

    pub fn is_in_range(&self) -> bool {
        self.to_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    pub fn is_neutral(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// Largest per-parameter distance to `other`.
    pub fn max_distance(&self, other: &BlendShapes) -> f32 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

/// Articulation class of a spoken sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisemeType {
    /// Silence / mouth at rest
    Rest,
    /// /p/, /b/, /m/ (lips together)
    Bilabial,
    /// /f/, /v/ (teeth on lip)
    Labiodental,
    /// /th/
    Dental,
    /// /t/, /d/, /n/, /s/, /z/, /l/
    Alveolar,
    /// /sh/, /zh/, /ch/, /j/
    Postalveolar,
    /// /k/, /g/, /ng/
    Velar,
    /// /a/
    Open,
    /// /e/
    Mid,
    /// /i/
    Narrow,
    /// /o/, /u/
    Rounded,
}

impl VisemeType {
    /// Classify a phoneme token (usually a single character).
    ///
    /// Unknown tokens classify as [`VisemeType::Rest`].
    pub fn classify(token: &str) -> VisemeType {
        match token.to_lowercase().as_str() {
            "p" | "b" | "m" => VisemeType::Bilabial,
            "f" | "v" => VisemeType::Labiodental,
            "th" => VisemeType::Dental,
            "t" | "d" | "n" | "s" | "z" | "l" => VisemeType::Alveolar,
            "sh" | "zh" | "ch" | "j" => VisemeType::Postalveolar,
            "k" | "g" | "ng" => VisemeType::Velar,
            "a" => VisemeType::Open,
            "e" => VisemeType::Mid,
            "i" => VisemeType::Narrow,
            "o" | "u" => VisemeType::Rounded,
            _ => VisemeType::Rest,
        }
    }

    /// Parse a wire label such as `"bilabial"`.
    pub fn from_label(label: &str) -> Option<VisemeType> {
        let viseme = match label.trim().to_lowercase().as_str() {
            "rest" => VisemeType::Rest,
            "bilabial" => VisemeType::Bilabial,
            "labiodental" => VisemeType::Labiodental,
            "dental" => VisemeType::Dental,
            "alveolar" => VisemeType::Alveolar,
            "postalveolar" => VisemeType::Postalveolar,
            "velar" => VisemeType::Velar,
            "open" => VisemeType::Open,
            "mid" => VisemeType::Mid,
            "narrow" => VisemeType::Narrow,
            "rounded" => VisemeType::Rounded,
            _ => return None,
        };
        Some(viseme)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VisemeType::Rest => "rest",
            VisemeType::Bilabial => "bilabial",
            VisemeType::Labiodental => "labiodental",
            VisemeType::Dental => "dental",
            VisemeType::Alveolar => "alveolar",
            VisemeType::Postalveolar => "postalveolar",
            VisemeType::Velar => "velar",
            VisemeType::Open => "open",
            VisemeType::Mid => "mid",
            VisemeType::Narrow => "narrow",
            VisemeType::Rounded => "rounded",
        }
    }

    /// Canonical pose for this class.
    pub fn blend_shapes(&self) -> BlendShapes {
        match self {
            VisemeType::Rest => BlendShapes::new(0.0, 0.0, 0.0),
            VisemeType::Bilabial => BlendShapes::new(0.1, 0.0, 0.3),
            VisemeType::Labiodental => BlendShapes::new(0.1, 0.0, 0.1),
            VisemeType::Dental => BlendShapes::new(0.2, 0.2, 0.0),
            VisemeType::Alveolar => BlendShapes::new(0.2, 0.1, 0.0),
            VisemeType::Postalveolar => BlendShapes::new(0.2, 0.0, 0.2),
            VisemeType::Velar => BlendShapes::new(0.3, 0.0, 0.0),
            VisemeType::Open => BlendShapes::new(0.6, 0.1, 0.0),
            VisemeType::Mid => BlendShapes::new(0.4, 0.2, 0.0),
            VisemeType::Narrow => BlendShapes::new(0.2, 0.3, 0.0),
            VisemeType::Rounded => BlendShapes::new(0.3, 0.0, 0.4),
        }
    }
}

/// One timed mouth pose within an utterance.
///
/// `start_ms < end_ms` always holds for events built by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedAnimationEvent {
    pub character: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub viseme_type: String,
    pub blend_shapes: BlendShapes,
}

impl TimedAnimationEvent {
    pub fn new(start_ms: u64, end_ms: u64, blend_shapes: BlendShapes) -> Self {
        Self {
            character: String::new(),
            start_ms,
            end_ms,
            viseme_type: String::new(),
            blend_shapes,
        }
    }

    pub fn with_character(mut self, character: impl Into<String>) -> Self {
        self.character = character.into();
        self
    }

    pub fn with_viseme_type(mut self, viseme_type: impl Into<String>) -> Self {
        self.viseme_type = viseme_type.into();
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// True when `t_ms` falls inside `[start_ms, end_ms]`.
    pub fn covers(&self, t_ms: u64) -> bool {
        self.start_ms <= t_ms && t_ms <= self.end_ms
    }
}

/// Viseme as sent by the synthesis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireViseme {
    #[serde(default)]
    pub character: String,
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    #[serde(default)]
    pub viseme_type: String,
    #[serde(default)]
    pub blend_shapes: Option<BlendShapes>,
}

/// Convert wire visemes into an ordered, well-formed event sequence.
///
/// Events with non-finite or negative times, or with `start >= end`, are
/// dropped. Missing blend shapes are filled from the viseme class, out of
/// range values are clamped, and the result is stably sorted by start.
pub fn parse_visemes(wire: Vec<WireViseme>) -> Vec<TimedAnimationEvent> {
    let total = wire.len();
    let mut events = Vec::with_capacity(total);

    for (index, viseme) in wire.into_iter().enumerate() {
        let (start, end) = (viseme.start_time_ms, viseme.end_time_ms);
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < 0.0 {
            warn!("Dropping viseme {} with invalid timing ({}, {})", index, start, end);
            continue;
        }
        let (start_ms, end_ms) = (start.round() as u64, end.round() as u64);
        if start_ms >= end_ms {
            warn!("Dropping viseme {} with empty interval [{}, {}]", index, start_ms, end_ms);
            continue;
        }

        let blend_shapes = match viseme.blend_shapes {
            Some(shapes) => {
                if !shapes.is_in_range() {
                    warn!("Clamping out-of-range blend shapes on viseme {}", index);
                }
                shapes.clamped()
            }
            None => VisemeType::from_label(&viseme.viseme_type)
                .unwrap_or_else(|| VisemeType::classify(&viseme.character))
                .blend_shapes(),
        };

        events.push(TimedAnimationEvent {
            character: viseme.character,
            start_ms,
            end_ms,
            viseme_type: viseme.viseme_type,
            blend_shapes,
        });
    }

    if events.windows(2).any(|w| w[0].start_ms > w[1].start_ms) {
        warn!("Viseme sequence out of order, sorting by start time");
        events.sort_by_key(|e| e.start_ms);
    }

    if events.len() < total {
        warn!("Kept {} of {} visemes", events.len(), total);
    }

    events
}

/// Estimate a viseme timeline from text alone.
///
/// Every character lasts [`ESTIMATED_CHAR_MS`], spaces [`ESTIMATED_SPACE_MS`].
pub fn estimate_visemes(text: &str) -> Vec<TimedAnimationEvent> {
    let mut events = Vec::with_capacity(text.len());
    let mut current = 0u64;

    for c in text.chars() {
        let token = c.to_string();
        let viseme = if c == ' ' {
            VisemeType::Rest
        } else {
            VisemeType::classify(&token)
        };
        let duration = if c == ' ' {
            ESTIMATED_SPACE_MS
        } else {
            ESTIMATED_CHAR_MS
        };

        events.push(
            TimedAnimationEvent::new(current, current + duration, viseme.blend_shapes())
                .with_character(token)
                .with_viseme_type(viseme.label()),
        );
        current += duration;
    }

    events
}

/// Rough speech duration for `text` in milliseconds.
///
/// Spaces are charged the full [`ESTIMATED_CHAR_MS`] here, unlike
/// [`estimate_visemes`], so for text with spaces the estimated audio runs past
/// the last estimated viseme and the tail plays at rest.
pub fn estimate_duration_ms(text: &str) -> u64 {
    text.chars().count() as u64 * ESTIMATED_CHAR_MS
}
