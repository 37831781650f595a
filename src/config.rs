use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::core::ValueKind;

/// One tracked channel and the input name downstream consumers know it by
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: None,
            kind: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Name used for this channel in the prepared snapshot
    pub fn input_name(&self) -> &str {
        self.input.as_deref().unwrap_or(&self.name)
    }
}

/// Channels that together describe the camera frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameChannels {
    /// Channel carrying the pixel data (2-D array or flat waveform)
    pub array: String,
    /// Row count channel, required when the array arrives flat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<String>,
    /// Column count channel, required when the array arrives flat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<String>,
    pub resolution: String,
    pub resolution_units: String,
}

/// Region isolation tunables
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IsolationParams {
    /// Fraction of the frame maximum below which pixels are clipped to zero
    pub clip_fraction: f64,
    pub median_radius: usize,
    /// Normalized level below which a pixel seeds the background
    pub low_marker: f64,
    /// Normalized level above which a pixel seeds the foreground
    pub high_marker: f64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            clip_fraction: 0.08,
            median_radius: 2,
            low_marker: 0.1,
            high_marker: 0.2,
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

/// Static acquisition configuration, fixed for the lifetime of an aggregator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionConfig {
    pub channels: Vec<ChannelSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameChannels>,
    /// Multiplicative factors applied to scalar inputs, keyed by input name
    #[serde(default)]
    pub scale_factors: BTreeMap<String, f64>,
    /// Opaque parameters merged into every snapshot
    #[serde(default)]
    pub static_fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub isolation: IsolationParams,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl AcquisitionConfig {
    /// Configuration tracking the given channels with no frame
    pub fn with_channels<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: names.into_iter().map(ChannelSpec::new).collect(),
            frame: None,
            scale_factors: BTreeMap::new(),
            static_fields: serde_json::Map::new(),
            isolation: IsolationParams::default(),
            queue_capacity: default_queue_capacity(),
        }
    }

    pub fn from_json(config: serde_json::Value) -> Result<Self> {
        let parsed: Self =
            serde_json::from_value(config).context("Failed to parse acquisition config")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .context(format!("Failed to read config from {:?}", path))?;
        let parsed: Self = serde_json::from_str(&json)
            .context(format!("Failed to deserialize config {:?}", path))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).context(format!("Failed to write config to {:?}", path))?;
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Check internal consistency: unique names, frame fields tracked, sane tunables
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(anyhow!("At least one channel must be configured"));
        }

        let mut names = HashSet::new();
        let mut inputs = HashSet::new();
        for spec in &self.channels {
            if !names.insert(spec.name.as_str()) {
                return Err(anyhow!("Duplicate channel: {}", spec.name));
            }
            if !inputs.insert(spec.input_name()) {
                return Err(anyhow!("Duplicate input name: {}", spec.input_name()));
            }
        }

        for key in self.static_fields.keys() {
            if inputs.contains(key.as_str()) {
                return Err(anyhow!("Static field `{}` collides with a channel input", key));
            }
        }

        if let Some(frame) = &self.frame {
            let fields = [
                Some(&frame.array),
                frame.rows.as_ref(),
                frame.cols.as_ref(),
                Some(&frame.resolution),
                Some(&frame.resolution_units),
            ];
            for field in fields.into_iter().flatten() {
                if !names.contains(field.as_str()) {
                    return Err(anyhow!("Frame field `{}` is not a configured channel", field));
                }
            }
            if frame.rows.is_some() != frame.cols.is_some() {
                return Err(anyhow!("Frame rows and cols channels must be given together"));
            }
        }

        let iso = &self.isolation;
        if !(0.0..1.0).contains(&iso.clip_fraction) {
            return Err(anyhow!("clip_fraction must be in [0, 1), got {}", iso.clip_fraction));
        }
        if !(0.0 <= iso.low_marker && iso.low_marker <= iso.high_marker && iso.high_marker < 1.0) {
            return Err(anyhow!(
                "Marker thresholds must satisfy 0 <= low <= high < 1, got {} / {}",
                iso.low_marker,
                iso.high_marker
            ));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be positive"));
        }

        Ok(())
    }
}
