//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use rdsweep::{
    BlockCheckpoint, ChannelStatistics, CheckpointKey, DirectoryLayout, LuminanceImageSet,
    ModelDims, ProbabilityTable,
};

pub const BLOCK: usize = 4;
pub const CHANNELS: usize = BLOCK * BLOCK;
pub const BASE_BIN_WIDTH: f32 = 6.0;

/// Smooth texture plus Gaussian noise, inside the studio range.
pub fn synthetic_images(count: usize, dims: ModelDims, seed: u64) -> LuminanceImageSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f64, 10.0).unwrap();
    let mut samples = Vec::with_capacity(count * dims.pixels());
    for image in 0..count {
        let phase = image as f64 * 0.9;
        for y in 0..dims.height {
            for x in 0..dims.width {
                let texture = 40.0 * ((x as f64 / 7.0 + phase).sin() * (y as f64 / 5.0).cos());
                let value = 128.0 + texture + noise.sample(&mut rng);
                samples.push(value.round().clamp(16.0, 235.0) as u8);
            }
        }
    }
    LuminanceImageSet::from_u8(dims, &samples).unwrap()
}

pub fn key(scaling_coefficient: f32, training_index: u32) -> CheckpointKey {
    CheckpointKey {
        bin_width_init: 1.0,
        scaling_coefficient,
        training_index,
        learned_bin_widths: true,
    }
}

/// Writes a block-transform checkpoint where the layout expects it.
pub fn write_checkpoint(layout: &DirectoryLayout, key: &CheckpointKey, bin_width: f32) {
    let path = layout.checkpoint_path(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    BlockCheckpoint::uniform(BLOCK, bin_width).save(&path).unwrap();
}

/// Statistics centering the DC channel on mid-grey.
pub fn statistics(exceptions: Vec<bool>) -> ChannelStatistics {
    let mut mean = vec![0.0f32; CHANNELS];
    mean[0] = 128.0 * BLOCK as f32;
    ChannelStatistics {
        mean,
        exceptions,
        laplace_scales: None,
        probability_table: None,
    }
}

pub fn write_statistics(layout: &DirectoryLayout, key: &CheckpointKey, stats: &ChannelStatistics) {
    let dir = layout.statistics_dir(key);
    std::fs::create_dir_all(&dir).unwrap();
    write_json(&dir.join("channel_statistics.json"), stats);
}

/// Discretized Laplace table over `±support` for every channel.
pub fn laplace_table(support: u32, scale_in_bins: f64) -> ProbabilityTable {
    let row: Vec<f64> = (-(support as i64)..=support as i64)
        .map(|k| (-(k.abs() as f64) / scale_in_bins).exp())
        .collect();
    let total: f64 = row.iter().sum();
    let row: Vec<f64> = row.iter().map(|p| p / total).collect();
    ProbabilityTable::new(support, vec![row; CHANNELS]).unwrap()
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
    std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
}
