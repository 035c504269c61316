//! Entropy coder backed by `constriction`'s range ANS.
//!
//! Regular channels are coded with their categorical model from the
//! probability table. Exception channels are charged the length of a signed
//! Exp-Golomb code of each quantization index.

use constriction::stream::{model::DefaultContiguousCategoricalEntropyModel, stack::DefaultAnsCoder};
use rdsweep_core::{LatentView, ProbabilityTable, Result, SweepError};

use crate::lossless::EntropyCoder;

/// Largest index magnitude the fallback code accepts.
pub const MAX_FALLBACK_INDEX: i64 = 1 << 31;

/// ANS coder over the channels of one image.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsEntropyCoder;

impl AnsEntropyCoder {
    pub fn new() -> Self {
        Self
    }
}

impl EntropyCoder for AnsEntropyCoder {
    fn code(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        table: &ProbabilityTable,
        exceptions: &[bool],
    ) -> Result<u64> {
        if bin_widths.len() != image.channels {
            return Err(SweepError::shape_mismatch(
                "bin widths",
                image.channels,
                bin_widths.len(),
            ));
        }
        if exceptions.len() != image.channels {
            return Err(SweepError::shape_mismatch(
                "exception flags",
                image.channels,
                exceptions.len(),
            ));
        }
        if table.channels() != image.channels {
            return Err(SweepError::shape_mismatch(
                "probability table",
                image.channels,
                table.channels(),
            ));
        }

        let mut coder = DefaultAnsCoder::new();
        let mut fallback_bits = 0u64;
        let mut symbols = Vec::with_capacity(image.rows * image.cols);

        for channel in 0..image.channels {
            let width = bin_widths[channel];

            if exceptions[channel] {
                for value in image.channel(channel) {
                    let index = index_of(channel, value, width)?;
                    fallback_bits += exp_golomb_bits(index).ok_or_else(|| {
                        SweepError::uncodable(
                            channel,
                            format!("index {index} exceeds the fallback code range"),
                        )
                    })?;
                }
                continue;
            }

            symbols.clear();
            for value in image.channel(channel) {
                let index = index_of(channel, value, width)?;
                let symbol = table.symbol(index).ok_or_else(|| {
                    SweepError::uncodable(
                        channel,
                        format!(
                            "index {index} outside the table support ±{}",
                            table.support
                        ),
                    )
                })?;
                symbols.push(symbol);
            }

            let model = DefaultContiguousCategoricalEntropyModel::from_floating_point_probabilities_fast(
                table.pmf(channel),
                None,
            )
            .map_err(|()| {
                SweepError::uncodable(channel, "probability table row is not a valid distribution")
            })?;
            coder
                .encode_iid_symbols_reverse(&symbols, &model)
                .map_err(|_| {
                    SweepError::uncodable(channel, "a symbol has zero probability in the table")
                })?;
        }

        Ok(coder.num_bits() as u64 + fallback_bits)
    }
}

/// Quantization index of a centered quantized value.
fn index_of(channel: usize, value: f32, bin_width: f32) -> Result<i64> {
    let ratio = f64::from(value) / f64::from(bin_width);
    if !ratio.is_finite() || ratio.abs() > MAX_FALLBACK_INDEX as f64 {
        return Err(SweepError::uncodable(
            channel,
            format!("value {value} has no representable quantization index"),
        ));
    }
    Ok(ratio.round() as i64)
}

/// Length in bits of the signed Exp-Golomb code of `index`, or `None` when
/// the index is out of range.
///
/// Indices are zigzag-mapped to `u = 2|k| - (k < 0)` and coded with
/// `2 * floor(log2(u + 1)) + 1` bits.
pub fn exp_golomb_bits(index: i64) -> Option<u64> {
    if index.unsigned_abs() > MAX_FALLBACK_INDEX as u64 {
        return None;
    }
    let magnitude = index.unsigned_abs();
    let zigzag = if index < 0 {
        2 * magnitude - 1
    } else {
        2 * magnitude
    };
    let exponent = u64::from((zigzag + 1).ilog2());
    Some(2 * exponent + 1)
}
