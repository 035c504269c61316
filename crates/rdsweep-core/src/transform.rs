//! Orthonormal DCT primitives for small blocks.
//!
//! Direct O(n²) evaluation; blocks used by the sweep are at most a few
//! dozen samples wide.

use std::f32::consts::{PI, SQRT_2};

/// 1D DCT-II with orthonormal scaling.
pub fn dct_1d(input: &[f32], output: &mut [f32]) {
    let n = input.len();
    assert_eq!(output.len(), n);
    if n == 0 {
        return;
    }
    let scale = (2.0 / n as f32).sqrt();

    for (k, out_k) in output.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        for (i, &x) in input.iter().enumerate() {
            sum += x * (PI * k as f32 * (i as f32 + 0.5) / n as f32).cos();
        }
        *out_k = sum * scale;
    }

    output[0] /= SQRT_2;
}

/// 1D DCT-III, the inverse of [`dct_1d`].
pub fn idct_1d(input: &[f32], output: &mut [f32]) {
    let n = input.len();
    assert_eq!(output.len(), n);
    if n == 0 {
        return;
    }
    let scale = (2.0 / n as f32).sqrt();

    for (i, out_i) in output.iter_mut().enumerate() {
        let mut sum = input[0] / SQRT_2;
        for (k, &x) in input.iter().enumerate().skip(1) {
            sum += x * (PI * k as f32 * (i as f32 + 0.5) / n as f32).cos();
        }
        *out_i = sum * scale;
    }
}

/// 2D DCT of a square `size × size` block, rows then columns.
pub fn dct_2d(input: &[f32], output: &mut [f32], size: usize) {
    separable(input, output, size, dct_1d);
}

/// 2D inverse DCT of a square block.
pub fn idct_2d(input: &[f32], output: &mut [f32], size: usize) {
    separable(input, output, size, idct_1d);
}

fn separable(input: &[f32], output: &mut [f32], size: usize, pass: fn(&[f32], &mut [f32])) {
    assert_eq!(input.len(), size * size);
    assert_eq!(output.len(), size * size);

    let mut temp = vec![0.0f32; size * size];
    let mut col_in = vec![0.0f32; size];
    let mut col_out = vec![0.0f32; size];

    for (src, dst) in input.chunks_exact(size).zip(temp.chunks_exact_mut(size)) {
        pass(src, dst);
    }

    for x in 0..size {
        for y in 0..size {
            col_in[y] = temp[y * size + x];
        }
        pass(&col_in, &mut col_out);
        for y in 0..size {
            output[y * size + x] = col_out[y];
        }
    }
}
