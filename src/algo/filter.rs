//! Zero-phase low-pass filtering of complex sweeps.

use num_complex::Complex64;

use crate::error::{Error, Result};

/// Second-order IIR filter coefficients, `a[0]` normalised to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadParams {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

/// Second-order digital Butterworth low-pass.
///
/// `wn` is the cutoff normalised to Nyquist and must lie in `(0, 1)`. The
/// analog prototype is mapped with the bilinear transform after pre-warping.
pub fn butter_lowpass2(wn: f64) -> Result<BiquadParams> {
    if !(wn > 0.0 && wn < 1.0) {
        return Err(Error::InvalidProcessorConfig(format!(
            "normalised cutoff {wn} outside (0, 1)"
        )));
    }
    let k = (std::f64::consts::FRAC_PI_2 * wn).tan();
    let k2 = k * k;
    let sqrt2 = std::f64::consts::SQRT_2;
    let norm = 1.0 / (1.0 + sqrt2 * k + k2);
    let b0 = k2 * norm;
    Ok(BiquadParams {
        b: [b0, 2.0 * b0, b0],
        a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - sqrt2 * k + k2) * norm],
    })
}

/// Edge padding used by [`filtfilt`].
pub const FILTFILT_PADLEN: usize = 3 * 3;

/// Steady-state initial conditions of the transposed direct form for a unit
/// step input.
pub fn lfilter_zi(p: &BiquadParams) -> [f64; 2] {
    let [b0, b1, b2] = p.b;
    let [_, a1, a2] = p.a;
    let r0 = b1 - a1 * b0;
    let r1 = b2 - a2 * b0;
    let z0 = (r0 + r1) / (1.0 + a1 + a2);
    [z0, r1 - a2 * z0]
}

/// Transposed direct form II, starting from state `zi`.
pub fn lfilter(p: &BiquadParams, x: &[Complex64], zi: [Complex64; 2]) -> Vec<Complex64> {
    let [b0, b1, b2] = p.b;
    let [_, a1, a2] = p.a;
    let [mut z0, mut z1] = zi;
    x.iter()
        .map(|&xn| {
            let y = xn * b0 + z0;
            z0 = xn * b1 - y * a1 + z1;
            z1 = xn * b2 - y * a2;
            y
        })
        .collect()
}

/// Forward-backward filtering: zero phase, squared magnitude response.
///
/// Edges are extended by odd reflection over [`FILTFILT_PADLEN`] samples and
/// each pass starts in steady state for its first sample, matching the usual
/// `filtfilt` conventions. Input must be longer than the pad length.
pub fn filtfilt(p: &BiquadParams, x: &[Complex64]) -> Result<Vec<Complex64>> {
    let n = x.len();
    if n <= FILTFILT_PADLEN {
        return Err(Error::SweepTooShort {
            len: n,
            required: FILTFILT_PADLEN,
        });
    }

    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * FILTFILT_PADLEN);
    ext.extend((1..=FILTFILT_PADLEN).rev().map(|i| first * 2.0 - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=FILTFILT_PADLEN).map(|i| last * 2.0 - x[n - 1 - i]));

    let zi = lfilter_zi(p);
    let scaled = |v: Complex64| [v * zi[0], v * zi[1]];

    let forward = lfilter(p, &ext, scaled(ext[0]));
    let reversed: Vec<Complex64> = forward.into_iter().rev().collect();
    let mut backward = lfilter(p, &reversed, scaled(reversed[0]));
    backward.reverse();

    Ok(backward[FILTFILT_PADLEN..FILTFILT_PADLEN + n].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn butter_matches_reference_coefficients() {
        // Reference values of a 2nd order Butterworth low-pass at Wn = 0.1.
        let p = butter_lowpass2(0.1).unwrap();
        let b = [0.02008337, 0.04016673, 0.02008337];
        let a = [1.0, -1.56101808, 0.64135154];
        for i in 0..3 {
            assert!(close(p.b[i], b[i], 1e-7), "b[{i}] = {}", p.b[i]);
            assert!(close(p.a[i], a[i], 1e-7), "a[{i}] = {}", p.a[i]);
        }
    }

    #[test]
    fn butter_rejects_out_of_range_cutoff() {
        assert!(butter_lowpass2(0.0).is_err());
        assert!(butter_lowpass2(1.0).is_err());
        assert!(butter_lowpass2(f64::NAN).is_err());
    }

    #[test]
    fn unity_dc_gain() {
        let p = butter_lowpass2(0.2).unwrap();
        let dc = p.b.iter().sum::<f64>() / p.a.iter().sum::<f64>();
        assert!(close(dc, 1.0, 1e-12));
    }

    #[test]
    fn steady_state_has_no_transient() {
        let p = butter_lowpass2(0.3).unwrap();
        let x = vec![Complex64::new(2.0, -1.0); 20];
        let zi = lfilter_zi(&p);
        let y = lfilter(&p, &x, [x[0] * zi[0], x[0] * zi[1]]);
        for v in y {
            assert!(close(v.re, 2.0, 1e-12) && close(v.im, -1.0, 1e-12));
        }
    }

    #[test]
    fn filtfilt_keeps_constants() {
        let p = butter_lowpass2(0.1).unwrap();
        let x = vec![Complex64::new(1.5, 3.0); 40];
        let y = filtfilt(&p, &x).unwrap();
        assert_eq!(y.len(), x.len());
        for (a, b) in x.iter().zip(&y) {
            assert!((a - b).norm() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn filtfilt_is_zero_phase() {
        // A symmetric pulse stays centred.
        let p = butter_lowpass2(0.15).unwrap();
        let x: Vec<Complex64> = (0..61)
            .map(|i| Complex64::new(if (28..=32).contains(&i) { 1.0 } else { 0.0 }, 0.0))
            .collect();
        let y = filtfilt(&p, &x).unwrap();
        let argmax = (0..y.len()).max_by(|&a, &b| y[a].norm().total_cmp(&y[b].norm())).unwrap();
        assert_eq!(argmax, 30);
        assert!(close(y[25].re, y[35].re, 1e-6));
    }

    #[test]
    fn filtfilt_rejects_short_input() {
        let p = butter_lowpass2(0.1).unwrap();
        let x = vec![Complex64::new(1.0, 0.0); FILTFILT_PADLEN];
        assert!(matches!(
            filtfilt(&p, &x),
            Err(Error::SweepTooShort { len: 9, required: 9 })
        ));
    }
}
