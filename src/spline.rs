/// One-dimensional interpolating and smoothing splines
///
/// Degree 1 is piecewise linear interpolation. Degree 3 with zero smoothing is the not-a-knot
/// cubic interpolant. Degree 3 with positive smoothing `s` is the natural cubic smoothing spline
/// whose residual sum of squares equals `s` (or the least squares line if even that is within `s`).
use crate::error::{Result, SurveyError};
use crate::tools::interpolate_between_known;

/// Bisection steps used to match the smoothing target
const SMOOTHING_ITERATIONS: usize = 200;
/// The penalty search spans this many decades around the typical knot spacing cubed
const PENALTY_DECADES: f64 = 12.;

#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivatives at the knots. Empty for degree 1.
    curvature: Vec<f64>,
}

impl Spline {
    /// Fit a spline of `degree` (1 or 3) through or near (`x`, `y`).
    ///
    /// # Arguments
    /// - `x`: Strictly increasing abscissa
    /// - `y`: Values at `x`
    /// - `degree`: Polynomial degree of each piece
    /// - `smoothing`: Target residual sum of squares. Zero interpolates exactly.
    pub fn fit(x: &[f64], y: &[f64], degree: usize, smoothing: f64) -> Result<Spline> {
        if x.len() != y.len() {
            return Err(SurveyError::Spline(format!("{} abscissa values but {} ordinates", x.len(), y.len())));
        }
        if !matches!(degree, 1 | 3) {
            return Err(SurveyError::Spline(format!("degree {degree} is not supported (1 or 3)")));
        }
        if x.len() <= degree {
            return Err(SurveyError::Spline(format!(
                "a degree {degree} spline needs at least {} samples but got {}",
                degree + 1,
                x.len()
            )));
        }
        if !(smoothing >= 0.) {
            return Err(SurveyError::Spline(format!("smoothing must be non-negative, got {smoothing}")));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(SurveyError::Spline("abscissa must be strictly increasing".to_string()));
        }

        match (degree, smoothing > 0.) {
            (1, false) => Ok(Spline {
                knots: x.to_vec(),
                values: y.to_vec(),
                curvature: Vec::new(),
            }),
            (1, true) => Err(SurveyError::Spline("smoothing is only supported for cubic splines".to_string())),
            (_, false) => Ok(Spline {
                knots: x.to_vec(),
                values: y.to_vec(),
                curvature: not_a_knot_curvature(x, y),
            }),
            (_, true) => Ok(smoothing_spline(x, y, smoothing)),
        }
    }

    pub fn degree(&self) -> usize {
        match self.curvature.is_empty() {
            true => 1,
            false => 3,
        }
    }

    /// Evaluate the spline. Points outside the knots use the polynomial of the closest piece.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.knots.len();
        let i = self.knots.partition_point(|k| *k <= x).clamp(1, n - 1) - 1;

        let (x0, x1) = (self.knots[i], self.knots[i + 1]);
        let (y0, y1) = (self.values[i], self.values[i + 1]);

        if self.curvature.is_empty() {
            return interpolate_between_known((x0, y0), (x1, y1), x);
        }

        let (m0, m1) = (self.curvature[i], self.curvature[i + 1]);
        let h = x1 - x0;
        let (a, b) = (x1 - x, x - x0);

        m0 * a.powi(3) / (6. * h) + m1 * b.powi(3) / (6. * h) + (y0 / h - m0 * h / 6.) * a + (y1 / h - m1 * h / 6.) * b
    }
}

fn spacing(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Second derivatives of the not-a-knot cubic interpolant (requires at least 4 points)
fn not_a_knot_curvature(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h = spacing(x);
    let slope = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect::<Vec<f64>>();

    // Interior unknowns M_1 ..= M_{n-2}, with M_0 and M_{n-1} eliminated by the not-a-knot
    // conditions (continuous third derivative at x_1 and x_{n-2}).
    let m = n - 2;
    let mut lower = vec![0.; m];
    let mut diag = vec![0.; m];
    let mut upper = vec![0.; m];
    let mut rhs = vec![0.; m];

    for j in 0..m {
        let i = j + 1;
        lower[j] = h[i - 1];
        diag[j] = 2. * (h[i - 1] + h[i]);
        upper[j] = h[i];
        rhs[j] = 6. * (slope[i] - slope[i - 1]);
    }
    diag[0] = 3. * h[0] + 2. * h[1] + h[0].powi(2) / h[1];
    upper[0] = h[1] - h[0].powi(2) / h[1];
    lower[m - 1] = h[n - 3] - h[n - 2].powi(2) / h[n - 3];
    diag[m - 1] = 2. * h[n - 3] + 3. * h[n - 2] + h[n - 2].powi(2) / h[n - 3];

    let interior = solve_tridiagonal(&lower, &diag, &upper, &rhs);

    let mut curvature = Vec::with_capacity(n);
    curvature.push(interior[0] * (1. + h[0] / h[1]) - interior[1] * h[0] / h[1]);
    curvature.extend_from_slice(&interior);
    curvature.push(interior[m - 1] * (1. + h[n - 2] / h[n - 3]) - interior[m - 2] * h[n - 2] / h[n - 3]);
    curvature
}

/// Thomas algorithm. `lower[0]` and `upper[len - 1]` are ignored.
fn solve_tridiagonal(lower: &[f64], diag: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let m = diag.len();
    let mut c = vec![0.; m];
    let mut d = vec![0.; m];

    c[0] = upper[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..m {
        let denominator = diag[i] - lower[i] * c[i - 1];
        c[i] = upper[i] / denominator;
        d[i] = (rhs[i] - lower[i] * d[i - 1]) / denominator;
    }

    let mut solution = d;
    for i in (0..m - 1).rev() {
        solution[i] -= c[i] * solution[i + 1];
    }
    solution
}

/// The second-difference operator Q (n x n-2) stored per interior knot as its three nonzeros
struct SecondDifference {
    columns: Vec<[f64; 3]>,
}

impl SecondDifference {
    fn new(h: &[f64]) -> SecondDifference {
        SecondDifference {
            columns: (1..h.len())
                .map(|i| [1. / h[i - 1], -1. / h[i - 1] - 1. / h[i], 1. / h[i]])
                .collect(),
        }
    }

    /// Q^T y
    fn transpose_mul(&self, y: &[f64]) -> Vec<f64> {
        self.columns
            .iter()
            .enumerate()
            .map(|(j, q)| q[0] * y[j] + q[1] * y[j + 1] + q[2] * y[j + 2])
            .collect()
    }

    /// Q gamma
    fn mul(&self, gamma: &[f64]) -> Vec<f64> {
        let mut out = vec![0.; gamma.len() + 2];
        for (j, (q, g)) in self.columns.iter().zip(gamma).enumerate() {
            out[j] += q[0] * g;
            out[j + 1] += q[1] * g;
            out[j + 2] += q[2] * g;
        }
        out
    }
}

/// Natural cubic smoothing spline (Reinsch) matching the residual target `smoothing`
fn smoothing_spline(x: &[f64], y: &[f64], smoothing: f64) -> Spline {
    let h = spacing(x);
    let q = SecondDifference::new(&h);
    let qty = q.transpose_mul(y);
    let m = qty.len();

    let solve = |penalty: f64| -> (Vec<f64>, f64) {
        // Bands of R + penalty * Q^T Q
        let mut band0 = vec![0.; m];
        let mut band1 = vec![0.; m];
        let mut band2 = vec![0.; m];
        for j in 0..m {
            let (i, c) = (j + 1, q.columns[j]);
            band0[j] = (h[i - 1] + h[i]) / 3. + penalty * (c[0].powi(2) + c[1].powi(2) + c[2].powi(2));
            if j + 1 < m {
                let next = q.columns[j + 1];
                band1[j] = h[i] / 6. + penalty * (c[1] * next[0] + c[2] * next[1]);
            }
            if j + 2 < m {
                band2[j] = penalty * c[2] * q.columns[j + 2][0];
            }
        }
        let gamma = solve_pentadiagonal(&band0, &band1, &band2, &qty);
        let residual = q.mul(&gamma).iter().map(|v| (penalty * v).powi(2)).sum::<f64>();
        (gamma, residual)
    };

    let typical_spacing = (x[x.len() - 1] - x[0]) / h.len() as f64;
    let reference = typical_spacing.powi(3).ln();
    let span = PENALTY_DECADES * 10f64.ln();

    // The residual grows monotonically with the penalty
    let penalty = match solve((reference + span).exp()).1 <= smoothing {
        true => (reference + span).exp(),
        false => {
            let (mut lo, mut hi) = (reference - span, reference + span);
            for _ in 0..SMOOTHING_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                match solve(mid.exp()).1 > smoothing {
                    true => hi = mid,
                    false => lo = mid,
                }
            }
            lo.exp()
        }
    };
    let gamma = solve(penalty).0;

    let correction = q.mul(&gamma);
    let values = y.iter().zip(&correction).map(|(y, c)| y - penalty * c).collect();

    let mut curvature = Vec::with_capacity(x.len());
    curvature.push(0.);
    curvature.extend_from_slice(&gamma);
    curvature.push(0.);

    Spline {
        knots: x.to_vec(),
        values,
        curvature,
    }
}

/// Solve a symmetric positive definite pentadiagonal system by LDL^T factorization.
///
/// `band0` is the diagonal, `band1[i]` = A[i+1][i] and `band2[i]` = A[i+2][i].
fn solve_pentadiagonal(band0: &[f64], band1: &[f64], band2: &[f64], rhs: &[f64]) -> Vec<f64> {
    let m = band0.len();
    let mut d = vec![0f64; m];
    // Unit lower factor: e[i] = L[i+1][i], f[i] = L[i+2][i]
    let mut e = vec![0f64; m];
    let mut f = vec![0f64; m];

    for i in 0..m {
        let mut pivot = band0[i];
        if i >= 1 {
            pivot -= e[i - 1].powi(2) * d[i - 1];
        }
        if i >= 2 {
            pivot -= f[i - 2].powi(2) * d[i - 2];
        }
        d[i] = pivot;

        let mut sub = band1[i];
        if i >= 1 {
            sub -= f[i - 1] * e[i - 1] * d[i - 1];
        }
        e[i] = sub / d[i];
        f[i] = band2[i] / d[i];
    }

    let mut z = vec![0.; m];
    for i in 0..m {
        z[i] = rhs[i];
        if i >= 1 {
            z[i] -= e[i - 1] * z[i - 1];
        }
        if i >= 2 {
            z[i] -= f[i - 2] * z[i - 2];
        }
    }

    let mut solution = vec![0.; m];
    for i in (0..m).rev() {
        solution[i] = z[i] / d[i];
        if i + 1 < m {
            solution[i] -= e[i] * solution[i + 1];
        }
        if i + 2 < m {
            solution[i] -= f[i] * solution[i + 2];
        }
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tolerance: f64) {
        assert!((a - b).abs() <= tolerance, "{a} != {b} (tolerance {tolerance})");
    }

    #[test]
    fn test_linear() {
        let spline = Spline::fit(&[0., 1., 3.], &[0., 2., 0.], 1, 0.).unwrap();

        assert_eq!(spline.degree(), 1);
        assert_eq!(spline.evaluate(0.5), 1.);
        assert_eq!(spline.evaluate(2.), 1.);
        assert_eq!(spline.evaluate(3.), 0.);
        // Extrapolation continues the end pieces
        assert_eq!(spline.evaluate(-1.), -2.);
    }

    #[test]
    fn test_cubic_reproduces_cubic() {
        let f = |x: f64| 0.5 * x.powi(3) - 2. * x.powi(2) + x - 4.;
        let x = [0., 0.5, 1.7, 2., 3.1, 4.];
        let y = x.iter().map(|x| f(*x)).collect::<Vec<f64>>();

        let spline = Spline::fit(&x, &y, 3, 0.).unwrap();

        for xi in [0., 0.25, 1., 1.9, 2.5, 3.9, 4.5, -0.5] {
            assert_close(spline.evaluate(xi), f(xi), 1e-9);
        }
    }

    #[test]
    fn test_four_point_cubic() {
        let f = |x: f64| x.powi(3) - x;
        let x = [1., 2., 4., 5.];
        let y = x.map(f);

        let spline = Spline::fit(&x, &y, 3, 0.).unwrap();

        assert_close(spline.evaluate(3.), f(3.), 1e-9);
        for (xi, yi) in x.iter().zip(y) {
            assert_close(spline.evaluate(*xi), yi, 1e-9);
        }
    }

    #[test]
    fn test_smoothing_residual() {
        let x = (0..20).map(|i| i as f64).collect::<Vec<f64>>();
        let y = x.iter().map(|x| (x / 3.).sin() + 0.1 * (x * 7.).cos()).collect::<Vec<f64>>();

        let target = 0.05;
        let spline = Spline::fit(&x, &y, 3, target).unwrap();

        let residual = x.iter().zip(&y).map(|(x, y)| (spline.evaluate(*x) - y).powi(2)).sum::<f64>();
        assert_close(residual, target, 1e-6);

        // A target above the residual of the best fitting line gives that line
        let line = Spline::fit(&x, &y, 3, 1e6).unwrap();
        let second_difference = line.evaluate(2.) - 2. * line.evaluate(1.) + line.evaluate(0.);
        assert_close(second_difference, 0., 1e-6);
    }

    #[test]
    fn test_invalid_input() {
        assert!(Spline::fit(&[0., 1., 2.], &[0., 1., 2.], 3, 0.).is_err());
        assert!(Spline::fit(&[0., 1., 2.], &[0., 1., 2.], 2, 0.).is_err());
        assert!(Spline::fit(&[0., 1., 1., 2.], &[0., 1., 2., 3.], 3, 0.).is_err());
        assert!(Spline::fit(&[0., 1., 2., 3.], &[0., 1., 2.], 3, 0.).is_err());
        assert!(Spline::fit(&[0., 1., 2., 3.], &[0., 1., 2., 3.], 3, -1.).is_err());
        assert!(Spline::fit(&[0., 1., 2.], &[0., 1., 2.], 1, 1.).is_err());
    }
}
