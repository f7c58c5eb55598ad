//! Small dense linear-algebra helpers for the `d≈10` matrices the arm
//! models keep. No BLAS: the sizes do not justify it.

use ndarray::{Array1, Array2, ArrayView1};

const PIVOT_EPSILON: f64 = 1e-12;

/// Lower-triangular Cholesky factor `L` with `A = L·Lᵗ`.
///
/// Returns `None` when `A` is not square or not positive definite.
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(sum > 0.0) {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                let ljj = l[[j, j]];
                if ljj.abs() < PIVOT_EPSILON {
                    return None;
                }
                l[[i, j]] = sum / ljj;
            }
        }
    }
    Some(l)
}

/// Inverse of a symmetric positive-definite matrix via its Cholesky factor.
pub fn invert_spd(a: &Array2<f64>) -> Option<Array2<f64>> {
    let l = cholesky(a)?;
    let n = l.nrows();
    let mut inverse = Array2::<f64>::zeros((n, n));

    for col in 0..n {
        // Forward substitution: L·y = e_col
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = if i == col { 1.0 } else { 0.0 };
            for k in 0..i {
                sum -= l[[i, k]] * y[k];
            }
            y[i] = sum / l[[i, i]];
        }
        // Back substitution: Lᵗ·x = y
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= l[[k, i]] * inverse[[k, col]];
            }
            inverse[[i, col]] = sum / l[[i, i]];
        }
    }
    Some(inverse)
}

/// Rank-one update `A ← A + x·xᵗ`.
pub fn add_outer(a: &mut Array2<f64>, x: ArrayView1<'_, f64>) {
    let n = x.len();
    for i in 0..n {
        for j in 0..n {
            a[[i, j]] += x[i] * x[j];
        }
    }
}

/// Sherman–Morrison: given `A⁻¹`, produce `(A + x·xᵗ)⁻¹` in place.
///
/// `A⁻¹` must be symmetric, which holds for every matrix the linear model keeps.
pub fn sherman_morrison_update(a_inv: &mut Array2<f64>, x: ArrayView1<'_, f64>) {
    let g: Array1<f64> = a_inv.dot(&x);
    let denom = 1.0 + x.dot(&g);
    let n = g.len();
    for i in 0..n {
        for j in 0..n {
            a_inv[[i, j]] -= g[i] * g[j] / denom;
        }
    }
}

/// Quadratic form `xᵗ·M·x`.
pub fn quadratic_form(m: &Array2<f64>, x: ArrayView1<'_, f64>) -> f64 {
    x.dot(&m.dot(&x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_cholesky_known_matrix() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        assert!((l[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((l[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((l[[1, 1]] - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(l[[0, 1]], 0.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(&a).is_none());
        assert!(invert_spd(&array![[0.0, 0.0], [0.0, 1.0]]).is_none());
    }

    #[test]
    fn test_invert_spd() {
        let a = array![[4.0, 2.0, 0.0], [2.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let inv = invert_spd(&a).unwrap();
        assert_close(&a.dot(&inv), &Array2::eye(3));
    }

    #[test]
    fn test_sherman_morrison_matches_direct_inverse() {
        let mut a = Array2::<f64>::eye(3);
        let mut a_inv = Array2::<f64>::eye(3);
        for x in [array![0.2, 0.5, 0.1], array![1.0, 0.0, 0.3], array![0.4, 0.4, 0.9]] {
            add_outer(&mut a, x.view());
            sherman_morrison_update(&mut a_inv, x.view());
        }
        assert_close(&a_inv, &invert_spd(&a).unwrap());
    }

    #[test]
    fn test_quadratic_form() {
        let m = array![[2.0, 0.0], [0.0, 3.0]];
        assert_eq!(quadratic_form(&m, array![1.0, 1.0].view()), 5.0);
    }
}
