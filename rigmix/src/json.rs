use crate::{AnimationStateData, Error, SkeletonData};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Root {
    #[serde(default)]
    default_mix: f32,
    #[serde(default)]
    mixes: Vec<MixDef>,
}

#[derive(Debug, Deserialize)]
struct MixDef {
    from: String,
    to: String,
    duration: f32,
}

impl AnimationStateData {
    /// Reads the default mix and per-pair mix durations, e.g.
    /// `{ "defaultMix": 0.1, "mixes": [ { "from": "walk", "to": "jump", "duration": 0.2 } ] }`.
    ///
    /// Animation names are resolved against `skeleton_data`; the empty animation name is accepted
    /// on either side.
    pub fn from_json_str(skeleton_data: Arc<SkeletonData>, input: &str) -> Result<Self, Error> {
        let root: Root = serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })?;

        if !root.default_mix.is_finite() || root.default_mix < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("defaultMix must be >= 0, got {}", root.default_mix),
            });
        }

        let mut data = AnimationStateData::new(skeleton_data);
        data.default_mix = root.default_mix;
        for mix in &root.mixes {
            data.set_mix(&mix.from, &mix.to, mix.duration)?;
        }
        log::debug!(
            "loaded {} mix durations (default {})",
            root.mixes.len(),
            data.default_mix
        );
        Ok(data)
    }
}
