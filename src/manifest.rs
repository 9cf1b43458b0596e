use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;

/// Query parameters forced onto every embed url. `background` hides the controls and implies
/// autoplay, mute and loop on the player side.
const PLAYBACK_PARAMS: [(&str, &str); 6] = [
    ("autoplay", "1"),
    ("muted", "1"),
    ("loop", "1"),
    ("background", "1"),
    ("autopause", "0"),
    ("playsinline", "1"),
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    clips: Vec<ClipDescriptor>,
    /// Optional `config` object, applied over the device preset.
    overrides: Option<serde_json::Value>,
}

/// One clip entry. A field of the wrong type is treated as absent, the rest of the clip stays.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDescriptor {
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub embed_url: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub aspect: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub overlap: Option<f64>,
    #[serde(default, deserialize_with = "lenient::leading_number")]
    pub parallax: Option<f64>,
}

impl FromStr for Manifest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: serde_json::Value = serde_json::from_str(s)?;

        // Anything without a `clips` array is not a manifest, individual clips are lenient.
        let Some(clips) = value.get("clips").and_then(|clips| clips.as_array()) else {
            return Err(Error::Manifest("no clips array".into()));
        };

        // Only entries that are not objects at all end up empty.
        let clips = clips
            .iter()
            .map(|clip| serde_json::from_value(clip.clone()).unwrap_or_default())
            .collect();

        let overrides = value.get("config").filter(|config| config.is_object()).cloned();

        Ok(Self { clips, overrides })
    }
}

impl Manifest {
    pub fn new(clips: Vec<ClipDescriptor>) -> Self {
        Self {
            clips,
            overrides: None,
        }
    }

    pub fn overrides(&self) -> Option<&serde_json::Value> {
        self.overrides.as_ref()
    }

    pub fn clips(&self) -> &[ClipDescriptor] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl ClipDescriptor {
    pub fn with_embed_url(url: impl Into<String>) -> Self {
        Self {
            embed_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// The url the iframe is mounted with, `None` when the clip has nothing to embed.
    pub fn embed_url_final(&self) -> Option<String> {
        self.embed_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(embed_url)
    }
}

/// Forces the playback parameters onto `base`, keeping whatever else it carries.
pub fn embed_url(base: &str) -> String {
    let Ok(mut url) = url::Url::parse(base) else {
        let separator = if base.contains('?') { '&' } else { '?' };
        let params = PLAYBACK_PARAMS
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        return format!("{base}{separator}{params}");
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| PLAYBACK_PARAMS.iter().all(|(forced, _)| &**k != *forced))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(PLAYBACK_PARAMS);

    url.to_string()
}

/// Fetches the manifest at `location`, bypassing caches with a timestamp parameter.
pub async fn fetch(location: &str, now_ms: u64) -> Result<Manifest, Error> {
    let separator = if location.contains('?') { '&' } else { '?' };
    let location = format!("{location}{separator}ts={now_ms}");

    tracing::info!(%location, "Loading manifest...");

    let response = reqwest::get(&location).await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::HttpCode(response.status().as_u16()));
    }

    let manifest: Manifest = response.text().await?.parse()?;

    tracing::info!(clips = manifest.len(), "Manifest parsed...");

    Ok(manifest)
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(Value::deserialize(deserializer)?.as_f64())
    }

    /// Numbers, or strings that start with one (`"0.08"`, `"12px"`).
    pub fn leading_number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => parse_leading(&text),
            _ => None,
        })
    }

    fn parse_leading(text: &str) -> Option<f64> {
        let text = text.trim_start();
        let end = text
            .char_indices()
            .take_while(|(i, c)| {
                c.is_ascii_digit()
                    || matches!(*c, '.' | 'e' | 'E')
                    || (*i == 0 && matches!(*c, '-' | '+'))
            })
            .last()
            .map(|(i, c)| i + c.len_utf8())?;

        (1..=end).rev().find_map(|len| text[..len].parse::<f64>().ok())
    }
}
