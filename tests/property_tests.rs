use anyhow::Result;
use async_trait::async_trait;
use ndarray::Array2;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use snapline::config::AcquisitionConfig;
use snapline::core::{ChannelUpdate, PipelineInvocation};
use snapline::engine::{SnapshotAggregator, UpdateOutcome};
use snapline::imaging::{calibrate, IsolatedRegion};
use snapline::prepare::CalibratedSnapshot;

#[derive(Default)]
struct Counter {
    calls: Mutex<Vec<u64>>,
}

#[async_trait]
impl PipelineInvocation for Counter {
    async fn invoke(&self, snapshot: CalibratedSnapshot) -> Result<()> {
        self.calls.lock().unwrap().push(snapshot.generation);
        Ok(())
    }
}

/// Feed `sequence` (channel indices) and record the invocation count after each update
fn run_sequence(channels: usize, sequence: &[usize]) -> (Vec<usize>, Vec<UpdateOutcome>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let names: Vec<String> = (0..channels).map(|i| format!("CH{}", i)).collect();
        let counter = Arc::new(Counter::default());
        let config = Arc::new(AcquisitionConfig::with_channels(names.clone()));
        let mut agg = SnapshotAggregator::new(config, counter.clone());

        let mut counts = Vec::new();
        let mut outcomes = Vec::new();
        for (step, &idx) in sequence.iter().enumerate() {
            let outcome = agg
                .on_update(ChannelUpdate::new(names[idx].clone(), step as f64))
                .await
                .unwrap();
            outcomes.push(outcome);
            counts.push(counter.calls.lock().unwrap().len());
        }
        (counts, outcomes)
    })
}

proptest! {
    #[test]
    fn dispatch_only_when_every_channel_present(
        (channels, sequence) in (1usize..6).prop_flat_map(|n| (Just(n), prop::collection::vec(0..n, 0..80)))
    ) {
        let (counts, outcomes) = run_sequence(channels, &sequence);

        let mut seen = HashSet::new();
        let mut expected = 0usize;
        for (step, &idx) in sequence.iter().enumerate() {
            seen.insert(idx);
            let completes = seen.len() == channels;
            if completes {
                expected += 1;
                seen.clear();
            }

            prop_assert_eq!(counts[step], expected);
            match &outcomes[step] {
                UpdateOutcome::Dispatched { generation } => {
                    prop_assert!(completes);
                    prop_assert_eq!(*generation as usize, expected - 1);
                }
                UpdateOutcome::Collecting { missing, .. } => {
                    prop_assert!(!completes);
                    prop_assert_eq!(*missing, channels - seen.len());
                }
                UpdateOutcome::Abandoned { .. } => prop_assert!(false, "no frame is configured"),
            }
        }
    }

    #[test]
    fn calibrated_box_is_centered_and_scaled(
        rows in 1usize..120,
        cols in 1usize..120,
        resolution in 1e-3f64..1e3,
    ) {
        let pixels = Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64);
        let region = IsolatedRegion { pixels: pixels.clone(), rows: 0..rows, cols: 0..cols };
        let dist = calibrate(&region, resolution, "um").unwrap();

        let width_x = resolution * cols as f64;
        let width_y = resolution * rows as f64;
        let tol = 1e-9 * width_x.max(width_y);
        prop_assert!((dist.bounds.width_x() - width_x).abs() <= tol);
        prop_assert!((dist.bounds.width_y() - width_y).abs() <= tol);
        prop_assert!((dist.bounds.min_x + dist.bounds.max_x).abs() <= tol);
        prop_assert!((dist.bounds.min_y + dist.bounds.max_y).abs() <= tol);
        prop_assert_eq!(dist.bounds.units.as_str(), "um");

        prop_assert_eq!(dist.pixel_data.dim(), (rows, cols));
        for r in 0..rows {
            prop_assert_eq!(dist.pixel_data.row(r), pixels.row(rows - 1 - r));
        }
    }
}
