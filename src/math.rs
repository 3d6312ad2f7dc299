// src/math.rs
// Dense linear algebra for the equations of motion. Vectors and fixed-size matrices come from
// nalgebra; the elimination below is written out so a vanishing pivot is reported with its
// column instead of surfacing as a generic failure. Sizes are fixed at compile time, so
// everything lives on the stack.

use crate::error::ModelError; // Singular / non-finite reporting
use nalgebra::{SMatrix, SVector, Vector2, Vector3};

/// Pivots smaller than this fraction of the largest matrix entry count as zero. Near-pole
/// azimuthal rows scale with sin²α, so the cut-off sits far below round-off level.
pub const SINGULAR_TOLERANCE: f64 = 1e-20;

pub type Vec2 = Vector2<f64>; // Planar body vectors
pub type Vec3 = Vector3<f64>; // Spatial body vectors

/// Solves `a x = b` by forward elimination with partial pivoting and back-substitution.
/// The system is taken as given; a vanishing pivot is reported instead of divided through.
pub fn solve_linear_system<const N: usize>(
    mut a: SMatrix<f64, N, N>,
    mut b: SVector<f64, N>,
) -> Result<SVector<f64, N>, ModelError> {
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    let threshold = SINGULAR_TOLERANCE * a.amax(); // Scale-relative zero

    for i in 0..N {
        let mut max_row = i; // Largest pivot candidate at or below row i
        for k in (i + 1)..N {
            if a[(k, i)].abs() > a[(max_row, i)].abs() {
                max_row = k;
            }
        }
        if a[(max_row, i)].abs() <= threshold {
            return Err(ModelError::SingularMatrix {
                column: i,
                pivot: a[(max_row, i)],
            });
        }
        a.swap_rows(i, max_row);
        b.swap_rows(i, max_row);

        for k in (i + 1)..N {
            let c = -a[(k, i)] / a[(i, i)]; // Elimination coefficient
            a[(k, i)] = 0.0;
            for j in (i + 1)..N {
                a[(k, j)] += c * a[(i, j)];
            }
            b[k] += c * b[i];
        }
    }

    let mut x = SVector::<f64, N>::zeros();
    for i in (0..N).rev() {
        let sum_ax: f64 = ((i + 1)..N).map(|j| a[(i, j)] * x[j]).sum(); // Known unknowns
        x[i] = (b[i] - sum_ax) / a[(i, i)];
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Matrix3, Vector2};

    #[test]
    fn solves_system_that_needs_pivoting() {
        // Zero in the leading position forces a row swap.
        let a = Matrix3::new(0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 1.0);
        let x_true = Vector3::new(1.0, -2.0, 0.5);
        let x = solve_linear_system(a, a * x_true).unwrap();
        assert_relative_eq!(x, x_true, epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_is_reported() {
        let a = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let err = solve_linear_system(a, Vector2::new(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, ModelError::SingularMatrix { column: 1, .. }));
    }

    #[test]
    fn non_finite_entries_are_reported() {
        let a = Matrix2::new(f64::NAN, 0.0, 0.0, 1.0);
        assert_eq!(
            solve_linear_system(a, Vector2::new(1.0, 1.0)),
            Err(ModelError::NonFinite)
        );
    }

    #[test]
    fn tiny_but_regular_pivot_is_accepted() {
        // A near-pole azimuthal row: entries of order sin²α with sin α = 1e-8.
        let a = Matrix2::new(2.0, 0.0, 0.0, 1e-16);
        let x = solve_linear_system(a, Vector2::new(4.0, 3e-16)).unwrap();
        assert_relative_eq!(x, Vector2::new(2.0, 3.0), max_relative = 1e-12);
    }
}
