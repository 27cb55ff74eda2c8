// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Dense Cholesky helpers for small symmetric positive-definite matrices.
//!
//! Matrices are row-major `d x d` slices. Only the lower triangle is read.

/// Returns true when the dense linear-algebra backend is compiled in.
pub const fn linalg_available() -> bool {
    cfg!(feature = "dense-linalg")
}

/// In-place Cholesky factorization `A = L L^T`, leaving `L` in the lower triangle.
///
/// Returns `false` when `A` is not numerically positive definite.
#[cfg(feature = "dense-linalg")]
pub fn cholesky_in_place(a: &mut [f64], d: usize) -> bool {
    debug_assert_eq!(a.len(), d * d);
    for j in 0..d {
        let mut diag = a[j * d + j];
        for k in 0..j {
            diag -= a[j * d + k] * a[j * d + k];
        }
        if !diag.is_finite() || diag <= 0.0 {
            return false;
        }
        let l_jj = diag.sqrt();
        a[j * d + j] = l_jj;

        for i in (j + 1)..d {
            let mut value = a[i * d + j];
            for k in 0..j {
                value -= a[i * d + k] * a[j * d + k];
            }
            a[i * d + j] = value / l_jj;
        }
        for i in 0..j {
            a[i * d + j] = 0.0;
        }
    }
    true
}

/// `log det(A)` from its Cholesky factor, summed in log space.
#[cfg(feature = "dense-linalg")]
pub fn log_det_from_cholesky(l: &[f64], d: usize) -> f64 {
    (0..d).map(|i| l[i * d + i].ln()).sum::<f64>() * 2.0
}

/// `trace(A^-1)` from the Cholesky factor of `A`.
///
/// `A^-1 = L^-T L^-1`, so the trace is the squared Frobenius norm of `L^-1`.
/// `column` is scratch space of length `d`.
#[cfg(feature = "dense-linalg")]
pub fn trace_inverse_from_cholesky(l: &[f64], d: usize, column: &mut [f64]) -> f64 {
    debug_assert_eq!(column.len(), d);
    let mut total = 0.0;
    for j in 0..d {
        // Forward-solve L y = e_j; y is zero above row j.
        for i in 0..d {
            if i < j {
                column[i] = 0.0;
                continue;
            }
            let mut value = if i == j { 1.0 } else { 0.0 };
            for k in j..i {
                value -= l[i * d + k] * column[k];
            }
            column[i] = value / l[i * d + i];
        }
        total += column[j..].iter().map(|v| v * v).sum::<f64>();
    }
    total
}
