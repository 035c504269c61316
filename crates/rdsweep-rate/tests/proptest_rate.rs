//! Property-based tests for rate estimation.
//!
//! - Analytic rate is non-increasing in bin width for a fixed input
//! - Both estimators return finite, non-negative rates
//!
//! Run with: cargo test -p rdsweep-rate --test proptest_rate

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use rdsweep_core::{ChannelStatistics, LatentView, ModelDims, ProbabilityTable};
use rdsweep_rate::{laplace_bin_bits, AnalyticRate, AnsEntropyCoder, LosslessRate, RateEstimator};

const CHANNELS: usize = 2;

fn values_strategy() -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
    (1usize..6, 1usize..6).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(-200.0f32..200.0, rows * cols * CHANNELS)
            .prop_map(move |data| (rows, cols, data))
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    /// Property: widening one bin never costs more bits.
    #[test]
    fn prop_bin_bits_non_increasing(
        value in -500.0f64..500.0,
        width in 0.01f64..50.0,
        growth in 1.0f64..8.0,
        scale in 0.001f64..100.0,
    ) {
        let narrow = laplace_bin_bits(value, width, scale);
        let wide = laplace_bin_bits(value, width * growth, scale);
        prop_assert!(narrow >= 0.0 && narrow.is_finite());
        prop_assert!(wide <= narrow + 1e-9, "{} > {}", wide, narrow);
    }

    /// Property: the analytic rate of a fixed latent drops as bins widen.
    #[test]
    fn prop_analytic_rate_non_increasing(
        (rows, cols, data) in values_strategy(),
        widths in prop::collection::vec(0.05f32..20.0, CHANNELS),
        growth in 1.0f32..4.0,
    ) {
        let image = LatentView { rows, cols, channels: CHANNELS, data: &data };
        let stats = ChannelStatistics::uncentered(CHANNELS);
        let dims = ModelDims::new(rows * 4, cols * 4);
        let estimator = AnalyticRate::new();

        let wider: Vec<f32> = widths.iter().map(|w| w * growth).collect();
        let narrow = estimator.estimate(image, &widths, &stats, dims).unwrap();
        let wide = estimator.estimate(image, &wider, &stats, dims).unwrap();
        prop_assert!(narrow.is_finite() && narrow >= 0.0);
        prop_assert!(wide <= narrow + 1e-9, "{} > {}", wide, narrow);
    }
}

#[test]
fn test_estimators_agree_in_order_of_magnitude() {
    // Gaussian latent quantized on a unit grid, coded with the matching
    // discretized table; analytic and exact rates should be close.
    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(0.0f64, 2.0).unwrap();
    let support = 16i64;

    let data: Vec<f32> = (0..32 * 32)
        .map(|_| {
            let index = normal.sample(&mut rng).round() as i64;
            index.clamp(-support, support) as f32
        })
        .collect();

    let mut counts = vec![1.0f64; 2 * support as usize + 1];
    for &v in &data {
        counts[(v as i64 + support) as usize] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    let pmf: Vec<f64> = counts.iter().map(|c| c / total).collect();

    let mut stats = ChannelStatistics::uncentered(1);
    stats.probability_table = Some(ProbabilityTable::new(support as u32, vec![pmf]).unwrap());

    let image = LatentView {
        rows: 32,
        cols: 32,
        channels: 1,
        data: &data,
    };
    let dims = ModelDims::new(128, 128);

    let analytic = AnalyticRate::new()
        .estimate(image, &[1.0], &stats, dims)
        .unwrap();
    let lossless = LosslessRate::new(AnsEntropyCoder)
        .estimate(image, &[1.0], &stats, dims)
        .unwrap();

    assert!(analytic > 0.0 && lossless > 0.0);
    assert!(
        (analytic / lossless) > 0.5 && (analytic / lossless) < 2.0,
        "analytic {analytic} lossless {lossless}"
    );
}
