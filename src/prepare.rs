//! Turns a frozen snapshot into the calibrated snapshot handed downstream.

use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::config::{AcquisitionConfig, FrameChannels};
use crate::core::Value;
use crate::engine::store::{ChannelReading, FrozenSnapshot};
use crate::error::ImagingError;
use crate::imaging::{calibrate, isolate, DistributionDescriptor, RawFrame};

const PER_PIXEL_SUFFIXES: [&str; 2] = ["/px", "/pixel"];

/// Snapshot as received by the pipeline invocation
#[derive(Debug, Clone, Serialize)]
pub struct CalibratedSnapshot {
    pub generation: u64,
    #[serde(skip)]
    pub collection_started_at: Instant,
    /// Wall-clock start of the collection cycle, RFC 3339
    pub collection_isotime: String,
    /// Channel values keyed by input name; the raw frame channel is omitted
    pub values: BTreeMap<String, Value>,
    pub distribution: Option<DistributionDescriptor>,
    pub static_fields: serde_json::Map<String, serde_json::Value>,
}

/// Collapse a per-pixel unit (`"um/px"`) to the bare physical unit (`"um"`)
pub fn normalize_units(units: &str) -> String {
    let trimmed = units.trim();
    PER_PIXEL_SUFFIXES
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn frame_dimension(readings: &BTreeMap<String, ChannelReading>, channel: &str) -> Result<usize, ImagingError> {
    let missing = || ImagingError::MissingFrameField { field: channel.to_string() };
    let v = readings
        .get(channel)
        .and_then(|r| r.value.as_scalar())
        .ok_or_else(missing)?;
    if v < 0.0 || v.fract() != 0.0 || !v.is_finite() {
        return Err(missing());
    }
    Ok(v as usize)
}

/// Build the raw frame from the configured frame channels.
///
/// Flat waveforms are reshaped with the row/column channels; units are
/// normalized here, before calibration sees them.
pub fn assemble_frame(
    readings: &mut BTreeMap<String, ChannelReading>,
    frame: &FrameChannels,
) -> Result<RawFrame, ImagingError> {
    let missing = |field: &str| ImagingError::MissingFrameField { field: field.to_string() };

    let resolution = readings
        .get(&frame.resolution)
        .and_then(|r| r.value.as_scalar())
        .ok_or_else(|| missing(&frame.resolution))?;
    let resolution_units = readings
        .get(&frame.resolution_units)
        .and_then(|r| r.value.as_text())
        .map(normalize_units)
        .ok_or_else(|| missing(&frame.resolution_units))?;

    let dims = match (&frame.rows, &frame.cols) {
        (Some(rows), Some(cols)) => Some((frame_dimension(readings, rows)?, frame_dimension(readings, cols)?)),
        _ => None,
    };

    let reading = readings.remove(&frame.array).ok_or_else(|| missing(&frame.array))?;
    let pixels = match (reading.value, dims) {
        (Value::Array(pixels), _) => pixels,
        (Value::Waveform(data), Some((rows, cols))) => {
            let len = data.len();
            Array2::from_shape_vec((rows, cols), data)
                .map_err(|_| ImagingError::FrameShape { len, rows, cols })?
        }
        _ => return Err(missing(&frame.array)),
    };

    Ok(RawFrame {
        pixels,
        resolution,
        resolution_units,
    })
}

/// Prepare a frozen snapshot for dispatch: isolate and calibrate the frame,
/// rename channels to their input names, apply scale factors and carry the
/// static fields through.
pub fn prepare_snapshot(
    frozen: FrozenSnapshot,
    config: &AcquisitionConfig,
) -> Result<CalibratedSnapshot, ImagingError> {
    let FrozenSnapshot {
        generation,
        collection_started_at,
        mut readings,
        static_fields,
    } = frozen;

    let distribution = match &config.frame {
        Some(frame_channels) => {
            let frame = assemble_frame(&mut readings, frame_channels)?;
            let region = isolate(&frame.pixels, &config.isolation)?;
            debug!(generation, shape = ?region.shape(), "frame isolated");
            Some(calibrate(&region, frame.resolution, &frame.resolution_units)?)
        }
        None => None,
    };

    let units_channel = config.frame.as_ref().map(|f| f.resolution_units.as_str());

    let mut values = BTreeMap::new();
    for spec in &config.channels {
        let Some(reading) = readings.remove(&spec.name) else {
            continue;
        };
        let input = spec.input_name();

        let value = match reading.value {
            Value::Text(units) if Some(spec.name.as_str()) == units_channel => {
                Value::Text(normalize_units(&units))
            }
            Value::Scalar(v) => Value::Scalar(v * config.scale_factors.get(input).copied().unwrap_or(1.0)),
            other => other,
        };
        values.insert(input.to_string(), value);
    }

    Ok(CalibratedSnapshot {
        generation,
        collection_started_at: collection_started_at.instant,
        collection_isotime: collection_started_at.wall.to_rfc3339(),
        values,
        distribution,
        static_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelSpec;
    use crate::engine::store::CollectionStart;
    use ndarray::s;

    fn reading(value: impl Into<Value>) -> ChannelReading {
        ChannelReading {
            value: value.into(),
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    fn camera_config() -> AcquisitionConfig {
        let mut config = AcquisitionConfig::with_channels(Vec::<String>::new());
        config.channels = vec![
            ChannelSpec::new("IMG").with_input("vcc_array"),
            ChannelSpec::new("ROWS").with_input("vcc_size_y"),
            ChannelSpec::new("COLS").with_input("vcc_size_x"),
            ChannelSpec::new("RES").with_input("vcc_resolution"),
            ChannelSpec::new("EGU").with_input("vcc_resolution_units"),
            ChannelSpec::new("TMIT").with_input("total_charge"),
        ];
        config.frame = Some(FrameChannels {
            array: "IMG".to_string(),
            rows: Some("ROWS".to_string()),
            cols: Some("COLS".to_string()),
            resolution: "RES".to_string(),
            resolution_units: "EGU".to_string(),
        });
        config
    }

    fn flat_block_frame() -> Vec<f64> {
        let mut frame = Array2::<f64>::zeros((8, 12));
        frame.slice_mut(s![2..6, 3..8]).fill(50.0);
        frame.into_raw_vec_and_offset().0
    }

    fn frozen(readings: Vec<(&str, ChannelReading)>) -> FrozenSnapshot {
        FrozenSnapshot {
            generation: 4,
            collection_started_at: CollectionStart::now(),
            readings: readings.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            static_fields: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_normalize_units() {
        assert_eq!(normalize_units("um/px"), "um");
        assert_eq!(normalize_units(" mm/pixel "), "mm");
        assert_eq!(normalize_units("um"), "um");
    }

    #[test]
    fn test_waveform_is_reshaped_and_calibrated() {
        let mut config = camera_config();
        config.scale_factors.insert("total_charge".to_string(), 0.5);

        let snapshot = prepare_snapshot(
            frozen(vec![
                ("IMG", reading(Value::Waveform(flat_block_frame()))),
                ("ROWS", reading(8.0)),
                ("COLS", reading(12.0)),
                ("RES", reading(9.0)),
                ("EGU", reading("um/px")),
                ("TMIT", reading(4.0)),
            ]),
            &config,
        )
        .unwrap();

        assert_eq!(snapshot.generation, 4);
        let dist = snapshot.distribution.unwrap();
        assert_eq!(dist.pixel_data.dim(), (4, 5));
        assert_eq!(dist.bounds.width_x(), 45.0);
        assert_eq!(dist.bounds.width_y(), 36.0);
        assert_eq!(dist.bounds.units, "um");

        assert!(!snapshot.values.contains_key("vcc_array"));
        assert_eq!(snapshot.values["vcc_resolution_units"], Value::Text("um".to_string()));
        assert_eq!(snapshot.values["total_charge"], Value::Scalar(2.0));
        assert_eq!(snapshot.values["vcc_size_y"], Value::Scalar(8.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = prepare_snapshot(
            frozen(vec![
                ("IMG", reading(Value::Waveform(vec![1.0; 10]))),
                ("ROWS", reading(3.0)),
                ("COLS", reading(4.0)),
                ("RES", reading(1.0)),
                ("EGU", reading("um")),
                ("TMIT", reading(1.0)),
            ]),
            &camera_config(),
        )
        .unwrap_err();
        assert_eq!(err, ImagingError::FrameShape { len: 10, rows: 3, cols: 4 });
    }

    #[test]
    fn test_text_resolution_is_missing_field() {
        let err = prepare_snapshot(
            frozen(vec![
                ("IMG", reading(Value::Waveform(flat_block_frame()))),
                ("ROWS", reading(8.0)),
                ("COLS", reading(12.0)),
                ("RES", reading("nine")),
                ("EGU", reading("um")),
                ("TMIT", reading(1.0)),
            ]),
            &camera_config(),
        )
        .unwrap_err();
        assert_eq!(err, ImagingError::MissingFrameField { field: "RES".to_string() });
    }

    #[test]
    fn test_without_frame_values_pass_through() {
        let mut config = AcquisitionConfig::with_channels(["A", "B"]);
        config.static_fields.insert("n_particle".to_string(), serde_json::json!(10000));

        let mut snap = frozen(vec![("A", reading(1.0)), ("B", reading("x"))]);
        snap.static_fields = config.static_fields.clone();

        let prepared = prepare_snapshot(snap, &config).unwrap();
        assert!(prepared.distribution.is_none());
        assert_eq!(prepared.values["A"], Value::Scalar(1.0));
        assert_eq!(prepared.values["B"], Value::Text("x".to_string()));
        assert_eq!(prepared.static_fields["n_particle"], serde_json::json!(10000));
    }
}
