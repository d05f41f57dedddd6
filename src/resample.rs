/// Extraction of time-stepped solver output at instrument channel times
use ndarray::{s, Array1, Array3, ArrayView1, ArrayView3, Axis};
use ndarray_stats::QuantileExt;
use rayon::prelude::*;

use crate::error::{Result, SurveyError};
use crate::spline::Spline;

/// Relative deviation from the target above which the nearest step is considered unreliable
pub const NEAREST_TOLERANCE: f64 = 0.1;
/// Number of steps in the local spline used when the nearest step is unreliable
pub const LOCAL_WINDOW: usize = 4;
const LOCAL_DEGREE: usize = 3;

/// Modelling time instants in seconds, with t = 0 at the start of the off-time
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTimes {
    pub times: Array1<f64>,
    /// First step of the off-time. Zero for step-off modelling.
    pub off_time_start_index: usize,
}

impl ModelTimes {
    pub fn new(times: Array1<f64>) -> Result<ModelTimes> {
        let off_time_start_index = match times.first() {
            Some(first) if *first < 0. => times
                .iter()
                .position(|t| *t > 0.)
                .ok_or_else(|| SurveyError::Format("the modelling times never reach the off-time (t > 0)".to_string()))?,
            _ => 0,
        };
        Ok(ModelTimes {
            times,
            off_time_start_index,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResampleMode {
    /// The closest step, or a local cubic spline where the closest step deviates too much
    Nearest,
    /// A spline through the full series of each receiver and component
    Spline { degree: usize, smoothing: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResampleOptions {
    /// Discard the steps before the off-time
    pub only_offtime: bool,
    /// Added to every modelling time before extraction
    pub zero_time_shift: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resampled {
    /// Values indexed by (channel, receiver, component)
    pub field: Array3<f64>,
    /// Channels that were interpolated because their closest step deviated too much
    pub fallback_channels: Vec<usize>,
}

/// Extract `field[step, receiver, component]` at `target_times`.
///
/// Every target must lie within the (nan-aware) range of the modelling times, or nothing is
/// extracted at all. Targets that coincide with a modelling time return that step unchanged in
/// nearest mode.
pub fn resample(
    field: ArrayView3<f64>,
    model_times: &ModelTimes,
    target_times: ArrayView1<f64>,
    mode: ResampleMode,
    options: &ResampleOptions,
) -> Result<Resampled> {
    if field.len_of(Axis(0)) != model_times.len() {
        return Err(SurveyError::Format(format!(
            "the field has {} steps but there are {} modelling times",
            field.len_of(Axis(0)),
            model_times.len()
        )));
    }

    let mut times = model_times.times.clone();
    if let Some(shift) = options.zero_time_shift {
        times += shift;
    }
    let (field, times) = match options.only_offtime {
        true => {
            let start = model_times.off_time_start_index;
            (field.slice_move(s![start.., .., ..]), times.slice(s![start..]).to_owned())
        }
        false => (field, times),
    };

    check_range(times.view(), target_times)?;

    match mode {
        ResampleMode::Nearest => nearest(field, times.view(), target_times),
        ResampleMode::Spline { degree, smoothing } => Ok(Resampled {
            field: global_spline(field, times.view(), target_times, degree, smoothing)?,
            fallback_channels: Vec::new(),
        }),
    }
}

fn check_range(times: ArrayView1<f64>, target_times: ArrayView1<f64>) -> Result<()> {
    // NaN when there is no valid time at all
    let min = *times.min_skipnan();
    let max = *times.max_skipnan();
    if min.is_nan() || max.is_nan() {
        return Err(SurveyError::Format("there are no valid modelling times".to_string()));
    }

    match target_times.iter().find(|t| !(**t >= min && **t <= max)) {
        Some(target) => Err(SurveyError::OutOfRange {
            target: *target,
            min,
            max,
        }),
        None => Ok(()),
    }
}

/// Index of the modelling time closest to `target`
pub fn nearest_index(times: ArrayView1<f64>, target: f64) -> Result<usize> {
    (&times - target)
        .mapv(f64::abs)
        .argmin_skipnan()
        .map_err(|e| SurveyError::Format(format!("could not find the closest modelling time: {e}")))
}

fn nearest(field: ArrayView3<f64>, times: ArrayView1<f64>, target_times: ArrayView1<f64>) -> Result<Resampled> {
    let (_, n_rec, n_comp) = field.dim();
    let mut output = Array3::<f64>::zeros((target_times.len(), n_rec, n_comp));
    let mut fallback_channels = Vec::new();

    for (i, target) in target_times.iter().enumerate() {
        let k = nearest_index(times, *target)?;

        if (times[k] - target).abs() <= NEAREST_TOLERANCE * target.abs() {
            output.index_axis_mut(Axis(0), i).assign(&field.index_axis(Axis(0), k));
            continue;
        }

        // Local spline on a window around the closest step, kept inside the series
        if times.len() < LOCAL_WINDOW {
            return Err(SurveyError::Spline(format!(
                "{} modelling times are too few for a {LOCAL_WINDOW} step local spline",
                times.len()
            )));
        }
        let start = k.saturating_sub(LOCAL_WINDOW / 2).min(times.len() - LOCAL_WINDOW);
        let window = times.slice(s![start..start + LOCAL_WINDOW]).to_vec();

        let values = (0..n_rec * n_comp)
            .into_par_iter()
            .map(|idx| -> Result<f64> {
                let (rec, comp) = (idx / n_comp, idx % n_comp);
                let y = field.slice(s![start..start + LOCAL_WINDOW, rec, comp]).to_vec();
                Ok(Spline::fit(&window, &y, LOCAL_DEGREE, 0.)?.evaluate(*target))
            })
            .collect::<Result<Vec<f64>>>()?;

        output
            .index_axis_mut(Axis(0), i)
            .assign(&Array1::from_vec(values).into_shape((n_rec, n_comp)).map_err(|e| SurveyError::Format(e.to_string()))?);
        fallback_channels.push(i);
    }

    Ok(Resampled {
        field: output,
        fallback_channels,
    })
}

fn global_spline(
    field: ArrayView3<f64>,
    times: ArrayView1<f64>,
    target_times: ArrayView1<f64>,
    degree: usize,
    smoothing: f64,
) -> Result<Array3<f64>> {
    let (_, n_rec, n_comp) = field.dim();
    let x = times.to_vec();

    let series = (0..n_rec * n_comp)
        .into_par_iter()
        .map(|idx| -> Result<Vec<f64>> {
            let (rec, comp) = (idx / n_comp, idx % n_comp);
            let y = field.slice(s![.., rec, comp]).to_vec();
            let spline = Spline::fit(&x, &y, degree, smoothing)?;
            Ok(target_times.iter().map(|t| spline.evaluate(*t)).collect::<Vec<f64>>())
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let mut output = Array3::<f64>::zeros((target_times.len(), n_rec, n_comp));
    for (idx, values) in series.iter().enumerate() {
        let (rec, comp) = (idx / n_comp, idx % n_comp);
        for (i, value) in values.iter().enumerate() {
            output[[i, rec, comp]] = *value;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Five steps, two receivers, three components. Values encode (step, receiver, component).
    fn synthetic() -> (Array3<f64>, ModelTimes) {
        let field = Array3::from_shape_fn((5, 2, 3), |(s, r, c)| 100. * s as f64 + 10. * r as f64 + c as f64 + 0.123);
        let times = ModelTimes::new(array![-1e-3, 1e-4, 2e-4, 4e-4, 8e-4]).unwrap();
        (field, times)
    }

    #[test]
    fn test_model_times() {
        let (_, times) = synthetic();
        assert_eq!(times.off_time_start_index, 1);

        assert_eq!(ModelTimes::new(array![0., 1e-4]).unwrap().off_time_start_index, 0);
        assert!(ModelTimes::new(array![-2., -1., 0.]).is_err());
    }

    #[test]
    fn test_exact_match_is_unchanged() {
        let (field, times) = synthetic();

        let out = resample(
            field.view(),
            &times,
            array![2e-4, 8e-4, 1e-4].view(),
            ResampleMode::Nearest,
            &ResampleOptions::default(),
        )
        .unwrap();

        assert!(out.fallback_channels.is_empty());
        assert_eq!(out.field.index_axis(Axis(0), 0), field.index_axis(Axis(0), 2));
        assert_eq!(out.field.index_axis(Axis(0), 1), field.index_axis(Axis(0), 4));
        assert_eq!(out.field.index_axis(Axis(0), 2), field.index_axis(Axis(0), 1));
    }

    #[test]
    fn test_out_of_range_fails_first() {
        let (field, times) = synthetic();

        let result = resample(
            field.view(),
            &times,
            array![2e-4, 1e-2].view(),
            ResampleMode::Nearest,
            &ResampleOptions::default(),
        );
        match result {
            Err(SurveyError::OutOfRange { target, min, max }) => {
                assert_eq!(target, 1e-2);
                assert_eq!(min, -1e-3);
                assert_eq!(max, 8e-4);
            }
            other => panic!("Expected an out of range error, got {:?}", other),
        }

        // The off-time start is out of range once the on-time is discarded
        let options = ResampleOptions {
            only_offtime: true,
            zero_time_shift: None,
        };
        assert!(resample(field.view(), &times, array![-5e-4].view(), ResampleMode::Nearest, &options).is_err());
    }

    #[test]
    fn test_fallback_to_local_spline() {
        // Values linear in time, so the local cubic reproduces them
        let times = ModelTimes::new(array![0., 1., 2., 3., 4., 10.]).unwrap();
        let field = Array3::from_shape_fn((6, 1, 2), |(s, _, c)| times.times[s] * (c as f64 + 1.));

        let out = resample(
            field.view(),
            &times,
            array![2., 7.].view(),
            ResampleMode::Nearest,
            &ResampleOptions::default(),
        )
        .unwrap();

        assert_eq!(out.fallback_channels, vec![1]);
        assert_eq!(out.field[[0, 0, 1]], 4.);
        assert!((out.field[[1, 0, 0]] - 7.).abs() < 1e-9);
        assert!((out.field[[1, 0, 1]] - 14.).abs() < 1e-9);
    }

    #[test]
    fn test_options() {
        let (field, times) = synthetic();

        let options = ResampleOptions {
            only_offtime: true,
            zero_time_shift: Some(1e-4),
        };
        // Shifted times are 2e-4, 3e-4, 5e-4 and 9e-4
        let out = resample(field.view(), &times, array![3e-4].view(), ResampleMode::Nearest, &options).unwrap();
        assert_eq!(out.field.index_axis(Axis(0), 0), field.index_axis(Axis(0), 2));
    }

    #[test]
    fn test_global_spline() {
        let times = ModelTimes::new(Array1::linspace(0., 1., 11)).unwrap();
        let field = Array3::from_shape_fn((11, 2, 1), |(s, r, _)| {
            let t = times.times[s];
            (r as f64 + 1.) * t.powi(3) - t
        });

        let out = resample(
            field.view(),
            &times,
            array![0.25, 0.55].view(),
            ResampleMode::Spline {
                degree: 3,
                smoothing: 0.,
            },
            &ResampleOptions::default(),
        )
        .unwrap();

        assert!((out.field[[0, 1, 0]] - (2. * 0.25f64.powi(3) - 0.25)).abs() < 1e-9);
        assert!((out.field[[1, 0, 0]] - (0.55f64.powi(3) - 0.55)).abs() < 1e-9);

        let linear = resample(
            field.view(),
            &times,
            array![0.25].view(),
            ResampleMode::Spline {
                degree: 1,
                smoothing: 0.,
            },
            &ResampleOptions::default(),
        )
        .unwrap();
        let expected = 0.5 * (field[[2, 0, 0]] + field[[3, 0, 0]]);
        assert!((linear.field[[0, 0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_step_count_mismatch() {
        let (field, _) = synthetic();
        let times = ModelTimes::new(array![0., 1.]).unwrap();
        assert!(resample(field.view(), &times, array![0.5].view(), ResampleMode::Nearest, &ResampleOptions::default()).is_err());
    }
}
