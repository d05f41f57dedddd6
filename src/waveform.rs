/// Periodic transmitter current waveforms
///
/// Times are relative to the start of the off-time, in the same unit as the base time (usually
/// ms). One period lasts four base times. The second half-period repeats the first with opposite
/// polarity.
use ndarray::Array1;

use crate::error::{Result, SurveyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformShape {
    Triangle,
    Trapezoid,
    /// Exponential rise during the on-time followed by a linear ramp to zero
    ExponentialRamp,
}

impl TryFrom<u8> for WaveformShape {
    type Error = SurveyError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(WaveformShape::Triangle),
            2 => Ok(WaveformShape::Trapezoid),
            3 => Ok(WaveformShape::ExponentialRamp),
            other => Err(SurveyError::UnsupportedWaveform(other)),
        }
    }
}

impl WaveformShape {
    pub fn code(&self) -> u8 {
        match self {
            WaveformShape::Triangle => 1,
            WaveformShape::Trapezoid => 2,
            WaveformShape::ExponentialRamp => 3,
        }
    }
}

/// The normalized current within the first half-period.
///
/// `time` must lie in `[0, 2 * base_time]`; anything else is an error, not clamped.
pub fn half_period_current(shape: WaveformShape, time: f64, base_time: f64, ramp_length: f64, tau: f64) -> Result<f64> {
    match shape {
        WaveformShape::ExponentialRamp => {
            if (0. ..=base_time).contains(&time) {
                Ok((1. - (-time / tau).exp()) / (1. - (-base_time / tau).exp()))
            } else if time > base_time && time <= base_time + ramp_length {
                Ok(1. - (time - base_time) / ramp_length)
            } else if time > base_time + ramp_length && time <= 2. * base_time {
                Ok(0.)
            } else {
                Err(SurveyError::WaveformDomain {
                    time,
                    limit: 2. * base_time,
                })
            }
        }
        other => Err(SurveyError::UnsupportedWaveform(other.code())),
    }
}

/// The transmitter current at `time`
///
/// # Arguments
/// - `shape`: Waveform shape code (only 3, exponential rise and linear ramp off, is implemented)
/// - `time`: Time since the start of the off-time
/// - `base_time`: A quarter of the period
/// - `ramp_length`: Duration of the linear turn-off ramp
/// - `tau`: Time constant of the exponential turn-on
/// - `amplitude`: Peak current
pub fn evaluate_waveform(
    shape: u8,
    time: f64,
    base_time: f64,
    ramp_length: f64,
    tau: f64,
    amplitude: f64,
) -> Result<f64> {
    let shape = WaveformShape::try_from(shape)?;
    if !(base_time > 0.) {
        return Err(SurveyError::Format(format!("the base time must be positive, got {base_time}")));
    }

    let half_period = 2. * base_time;
    let period = 4. * base_time;

    // Shift so that t = 0 is the start of the on-time, then fold into the first period
    let t = (time + base_time + ramp_length).rem_euclid(period);

    let current = match t <= half_period {
        true => half_period_current(shape, t, base_time, ramp_length, tau)?,
        false => -half_period_current(shape, t - half_period, base_time, ramp_length, tau)?,
    };
    Ok(current * amplitude)
}

/// Evaluate the waveform for a series of times
pub fn current_series(
    shape: u8,
    times: &[f64],
    base_time: f64,
    ramp_length: f64,
    tau: f64,
    amplitude: f64,
) -> Result<Array1<f64>> {
    times
        .iter()
        .map(|t| evaluate_waveform(shape, *t, base_time, ramp_length, tau, amplitude))
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}
