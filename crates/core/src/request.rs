//! Generation request model and caller-input coercion.
//!
//! Callers send loosely-typed JSON (numbers may arrive as strings, toggles
//! as `0`/`1`, keys in camelCase or snake_case). [`GenerationRequest::from_input`]
//! validates the prompt and coerces everything else, falling back to the
//! defaults below when a field is absent or unusable.

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_NEGATIVE_PROMPT: &str = "bad quality, blurry";
/// Requested width/height when the caller does not supply one.
pub const DEFAULT_DIMENSION: i64 = 1024;
pub const DEFAULT_LORA_STRENGTH: f64 = 0.7;
pub const DEFAULT_UPSCALE_FACTOR: f64 = 1.5;
/// Exclusive upper bound for randomly drawn seeds.
pub const MAX_RANDOM_SEED: u64 = 999_999_999_999;

/// Film grain size used when the caller sets a grain amount but no size.
pub const DEFAULT_GRAIN_SIZE: f64 = 0.3;

/// A LoRA applied on top of the base model.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleModifier {
    /// LoRA file name as known to the engine.
    pub name: String,
    /// Model strength applied by the LoRA loader.
    pub strength: f64,
}

/// Second-pass latent upscale settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpscaleOptions {
    pub enabled: bool,
    /// Rescale factor handed to the upscale node.
    pub factor: f64,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: DEFAULT_UPSCALE_FACTOR,
        }
    }
}

/// Colour and film post-processing parameters.
///
/// Every field defaults to a value that leaves the image untouched; the
/// post-processing pass is only added when at least one group deviates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessing {
    pub exposure: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub vibrance: f64,
    pub temperature: f64,
    pub tint: f64,
    pub sharpness: f64,
    pub vignette: f64,
    pub grain_amount: f64,
    pub grain_size: f64,
}

impl Default for PostProcessing {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            vibrance: 0.0,
            temperature: 0.0,
            tint: 0.0,
            sharpness: 0.0,
            vignette: 0.0,
            grain_amount: 0.0,
            grain_size: DEFAULT_GRAIN_SIZE,
        }
    }
}

impl PostProcessing {
    /// Build from a caller-supplied object, defaulting each missing or
    /// non-numeric field. Non-object values yield the neutral set.
    pub fn from_value(value: &Value) -> Self {
        let neutral = Self::default();
        let Some(map) = value.as_object() else {
            return neutral;
        };
        let field = |keys: &[&str], default: f64| {
            lookup(map, keys).and_then(coerce_f64).unwrap_or(default)
        };

        Self {
            exposure: field(&["exposure"], neutral.exposure),
            contrast: field(&["contrast"], neutral.contrast),
            saturation: field(&["saturation"], neutral.saturation),
            vibrance: field(&["vibrance"], neutral.vibrance),
            temperature: field(&["temp", "temperature"], neutral.temperature),
            tint: field(&["tint"], neutral.tint),
            sharpness: field(&["sharpness"], neutral.sharpness),
            vignette: field(&["vignette"], neutral.vignette),
            grain_amount: field(&["grain_amount", "grainAmount"], neutral.grain_amount),
            grain_size: field(&["grain_size", "grainSize"], neutral.grain_size),
        }
    }

    pub fn levels_enabled(&self) -> bool {
        self.exposure != 0.0 || self.contrast != 1.0 || self.saturation != 1.0 || self.vibrance != 0.0
    }

    pub fn temp_tint_enabled(&self) -> bool {
        self.temperature != 0.0 || self.tint != 0.0
    }

    pub fn sharpen_enabled(&self) -> bool {
        self.sharpness > 0.0
    }

    pub fn vignette_enabled(&self) -> bool {
        self.vignette > 0.0
    }

    pub fn grain_enabled(&self) -> bool {
        self.grain_amount > 0.0
    }

    /// `true` when no group would change the image.
    pub fn is_neutral(&self) -> bool {
        !(self.levels_enabled()
            || self.temp_tint_enabled()
            || self.sharpen_enabled()
            || self.vignette_enabled()
            || self.grain_enabled())
    }
}

/// Fully-resolved parameters for one generation.
///
/// `width` and `height` hold the caller's requested values; alignment and
/// clamping happen when the graph is built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative: String,
    pub width: i64,
    pub height: i64,
    pub seed: u64,
    pub style: Option<StyleModifier>,
    pub face_detailer: bool,
    pub upscale: UpscaleOptions,
    pub post: PostProcessing,
}

impl GenerationRequest {
    /// A request with every optional pass disabled and a random seed.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative: DEFAULT_NEGATIVE_PROMPT.to_string(),
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            seed: random_seed(),
            style: None,
            face_detailer: false,
            upscale: UpscaleOptions::default(),
            post: PostProcessing::default(),
        }
    }

    /// Validate and coerce a caller's `input` object.
    ///
    /// Only the prompt is mandatory: it must be a string with at least one
    /// non-whitespace character. A missing or negative seed draws a random
    /// one (`-1` is the usual "random" convention in front ends).
    pub fn from_input(input: &Value) -> Result<Self, CoreError> {
        let map = input
            .as_object()
            .ok_or_else(|| CoreError::Validation("Input must be a JSON object".to_string()))?;

        let prompt = match map.get("prompt") {
            Some(Value::String(p)) if !p.trim().is_empty() => p.clone(),
            _ => {
                return Err(CoreError::Validation(
                    "Missing or invalid 'prompt' in input".to_string(),
                ))
            }
        };

        let negative = lookup(map, &["negative", "negative_prompt"])
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
            .to_string();

        let dimension = |key: &str| {
            lookup(map, &[key])
                .and_then(coerce_i64)
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_DIMENSION)
        };

        let seed = lookup(map, &["seed"])
            .and_then(coerce_i64)
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or_else(random_seed);

        let style = lookup(map, &["loraName", "lora_name"])
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(|name| StyleModifier {
                name: name.to_string(),
                strength: lookup(map, &["loraStrength", "lora_strength"])
                    .and_then(coerce_f64)
                    .unwrap_or(DEFAULT_LORA_STRENGTH),
            });

        let upscale = UpscaleOptions {
            enabled: flag(map, &["useUpscale", "use_upscale"]),
            factor: lookup(map, &["upscaleFactor", "upscale_factor"])
                .and_then(coerce_f64)
                .filter(|f| *f > 0.0)
                .unwrap_or(DEFAULT_UPSCALE_FACTOR),
        };

        let post = lookup(map, &["pp", "post_processing", "postProcessing"])
            .map(PostProcessing::from_value)
            .unwrap_or_default();

        Ok(Self {
            prompt,
            negative,
            width: dimension("width"),
            height: dimension("height"),
            seed,
            style,
            face_detailer: flag(map, &["useFaceDetailer", "use_face_detailer"]),
            upscale,
            post,
        })
    }
}

/// Draw a seed in `[0, MAX_RANDOM_SEED)`.
pub fn random_seed() -> u64 {
    rand::rng().random_range(0..MAX_RANDOM_SEED)
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

/// First non-null value among `keys`, in order.
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// Integers from JSON numbers (fractions truncate) or numeric strings.
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Truthiness for feature toggles: booleans, non-zero numbers, and the
/// strings `true`/`1`/`yes`/`on`.
fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

fn flag(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .any(coerce_bool)
}
