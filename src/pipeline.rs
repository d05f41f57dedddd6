/// Processing runs started from the command line
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use ndarray::Array1;

use crate::error::{Result, SurveyError};
use crate::record::SurveyRecord;
use crate::resample::{ResampleMode, ResampleOptions};
use crate::{decay, formats, io, irap, resample};

/// Labels of receiver components when three are modelled
const RECEIVER_AXES: [&str; 3] = ["X", "Y", "Z"];

/// Parameters to parse (and optionally export) a batch of survey files
#[derive(Debug, Clone)]
pub struct SurveyParams {
    pub filepaths: Vec<PathBuf>,
    /// JSON output. A directory when there is more than one input file.
    pub json_path: Option<PathBuf>,
    pub quiet: bool,
}

/// Parameters to resample solver output at instrument channel times
#[derive(Debug, Clone)]
pub struct ResampleParams {
    pub field_path: PathBuf,
    pub times_path: PathBuf,
    /// Channel times in seconds
    pub channels: Vec<f64>,
    pub n_rec: usize,
    pub n_comp: usize,
    pub observations: Option<PathBuf>,
    /// 1-based column of the station offsets in the observation file
    pub observation_column: usize,
    pub mode: ResampleMode,
    pub options: ResampleOptions,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum RunParams {
    Survey(SurveyParams),
    Resample(ResampleParams),
    /// A multi-model IRAP text file to split into one file per model
    ConvertIrap(PathBuf),
}

pub fn run(params: RunParams) -> Result<()> {
    match params {
        RunParams::Survey(params) => run_survey(&params).map(|_| ()),
        RunParams::Resample(params) => run_resample(&params).map(|_| ()),
        RunParams::ConvertIrap(filepath) => run_irap_conversion(&filepath).map(|_| ()),
    }
}

fn log_event(step_name: &str, event: &str, start_time: Instant) {
    info!(
        "{} (duration: {:.2}s):\t{}",
        step_name,
        start_time.elapsed().as_secs_f32(),
        event
    );
}

/// Parse every survey file, print its summary and export it if requested
pub fn run_survey(params: &SurveyParams) -> Result<Vec<SurveyRecord>> {
    let n_files = params.filepaths.len();
    let mut records = Vec::with_capacity(n_files);

    for (i, filepath) in params.filepaths.iter().enumerate() {
        let start_time = Instant::now();
        let record = formats::parse(filepath)?;
        log_event(
            "parse",
            &format!("{}/{}: {:?} read as {}", i + 1, n_files, filepath, record.format()),
            start_time,
        );

        if !params.quiet {
            println!("{}", record);
        }

        if let Some(json_path) = &params.json_path {
            let start_time = Instant::now();
            let output = json_output_path(json_path, filepath, n_files)?;
            io::export_json(&record, &output)?;
            log_event("export", &format!("Exported to {:?}", output), start_time);
        }
        records.push(record);
    }
    Ok(records)
}

/// Split a multi-model IRAP file into one IRAP file per model, next to the input
pub fn run_irap_conversion(filepath: &Path) -> Result<Vec<PathBuf>> {
    let start_time = Instant::now();
    let outputs = irap::convert(filepath)?;
    for (i, output) in outputs.iter().enumerate() {
        info!("Saved {:?} ({}/{})", output, i + 1, outputs.len());
    }
    log_event("convert", &format!("Converted {:?}", filepath), start_time);
    Ok(outputs)
}

/// Where the JSON of one input file goes.
///
/// With many inputs (or an existing directory) the output is "<stem>.json" in that directory.
fn json_output_path(json_path: &Path, filepath: &Path, n_files: usize) -> Result<PathBuf> {
    if n_files < 2 && !json_path.is_dir() {
        return Ok(json_path.to_path_buf());
    }
    std::fs::create_dir_all(json_path)?;

    let stem = filepath
        .file_stem()
        .ok_or_else(|| SurveyError::NotAFile(filepath.to_path_buf()))?;
    Ok(json_path.join(stem).with_extension("json"))
}

/// Labels of `n_comp` receiver components
pub fn component_labels(n_comp: usize) -> Vec<String> {
    match n_comp {
        3 => RECEIVER_AXES.iter().map(|s| s.to_string()).collect(),
        1 => vec![RECEIVER_AXES[2].to_string()],
        _ => (1..=n_comp).map(|i| format!("C{i}")).collect(),
    }
}

/// Resample solver output at the requested channel times and write a decay file
pub fn run_resample(params: &ResampleParams) -> Result<SurveyRecord> {
    let start_time = Instant::now();
    let model_times = io::load_time_stepping_scheme(&params.times_path)?;
    let field = io::load_field(&params.field_path, params.n_rec, params.n_comp)?;
    log_event(
        "load",
        &format!(
            "{} steps of {} receivers and {} components",
            model_times.len(),
            params.n_rec,
            params.n_comp
        ),
        start_time,
    );

    let stations = match &params.observations {
        Some(path) => io::load_observation_line(path, params.observation_column)?,
        None => Array1::range(1., params.n_rec as f64 + 1., 1.),
    };
    if stations.len() != params.n_rec {
        return Err(SurveyError::Format(format!(
            "{} stations were read but there are {} receivers",
            stations.len(),
            params.n_rec
        )));
    }

    let start_time = Instant::now();
    let targets = Array1::from_vec(params.channels.clone());
    let resampled = resample::resample(field.view(), &model_times, targets.view(), params.mode, &params.options)?;
    log_event(
        "resample",
        &format!("{} channels extracted ({:?})", params.channels.len(), params.mode),
        start_time,
    );
    if !resampled.fallback_channels.is_empty() {
        warn!(
            "{} of {} channels had no close modelling time and were interpolated: {:?}",
            resampled.fallback_channels.len(),
            params.channels.len(),
            resampled.fallback_channels
        );
    }

    let start_time = Instant::now();
    let record = decay::record_from_field(
        &params.output_path,
        resampled.field.view(),
        &params.channels,
        &stations.to_vec(),
        &component_labels(params.n_comp),
    )?;
    decay::write_decay_file(&record, &params.output_path)?;
    log_event("export", &format!("Wrote {:?}", params.output_path), start_time);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileFormat;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Six steps of 0.1 ms and two receivers with one component. The value is 10 * step + receiver.
    fn solver_output(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        let scheme = (0..6)
            .map(|i| format!("{} 1e-4 {:e}", i + 1, i as f64 * 1e-4))
            .collect::<Vec<String>>()
            .join("\n");
        let field = (0..6)
            .flat_map(|step| (0..2).map(move |rec| format!("{}", 10 * step + rec)))
            .collect::<Vec<String>>()
            .join("\n");
        (write(dir, "dbdt", &field), write(dir, "time_stepping_scheme", &scheme))
    }

    fn resample_params(dir: &tempfile::TempDir) -> ResampleParams {
        let (field_path, times_path) = solver_output(dir);
        ResampleParams {
            field_path,
            times_path,
            channels: vec![1e-4, 3e-4],
            n_rec: 2,
            n_comp: 1,
            observations: None,
            observation_column: 2,
            mode: ResampleMode::Nearest,
            options: ResampleOptions::default(),
            output_path: dir.path().join("decay.dat"),
        }
    }

    #[test]
    fn test_component_labels() {
        assert_eq!(component_labels(3), vec!["X", "Y", "Z"]);
        assert_eq!(component_labels(1), vec!["Z"]);
        assert_eq!(component_labels(2), vec!["C1", "C2"]);
    }

    #[test]
    fn test_run_resample() {
        let temp_dir = tempfile::tempdir().unwrap();
        let params = resample_params(&temp_dir);

        run_resample(&params).unwrap();

        let record = crate::decay::parse(&params.output_path).unwrap();
        assert_eq!(record.format(), FileFormat::Decay);
        assert_eq!(record.components(), &["Z".to_string()]);

        let times = record.channels().times().unwrap();
        assert!((times[0] - 0.1).abs() < 1e-9);
        assert!((times[1] - 0.3).abs() < 1e-9);

        let table = record.numeric_readings().unwrap();
        assert_eq!(table.rows()[0].station, 1.);
        assert_eq!(table.rows()[1].station, 2.);
        assert_eq!(table.values().row(0).to_vec(), vec![10., 30.]);
        assert_eq!(table.values().row(1).to_vec(), vec![11., 31.]);
    }

    #[test]
    fn test_run_resample_with_observations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut params = resample_params(&temp_dir);

        params.observations = Some(write(&temp_dir, "obs", "1 -50 0\n2 50 0\n"));
        let record = run_resample(&params).unwrap();
        let table = record.numeric_readings().unwrap();
        assert_eq!(table.rows()[0].station, -50.);
        assert_eq!(table.rows()[1].station, 50.);

        // One station too few
        params.observations = Some(write(&temp_dir, "obs_short", "1 -50 0\n"));
        assert!(matches!(run_resample(&params), Err(SurveyError::Format(_))));
    }

    #[test]
    fn test_run_resample_out_of_range() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut params = resample_params(&temp_dir);
        params.channels = vec![1e-4, 1e-2];

        assert!(matches!(run_resample(&params), Err(SurveyError::OutOfRange { .. })));
        assert!(!params.output_path.is_file());
    }

    #[test]
    fn test_run_survey() {
        let temp_dir = tempfile::tempdir().unwrap();
        let content = "Data type: dB/dt; UNIT: nT/s\nNumber of stations: 1\nStations: 10\nstation 10\nChannel times\nheader\n1 0.1 4.0\n";
        let filepaths = vec![write(&temp_dir, "a_z.dat", content), write(&temp_dir, "b_x.dat", content)];

        let json_dir = temp_dir.path().join("json");
        let params = SurveyParams {
            filepaths,
            json_path: Some(json_dir.clone()),
            quiet: true,
        };
        let records = run_survey(&params).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].components(), &["Z".to_string()]);
        assert_eq!(records[1].components(), &["X".to_string()]);
        assert!(json_dir.join("a_z.json").is_file());
        assert!(json_dir.join("b_x.json").is_file());
    }

    #[test]
    fn test_run_dispatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let content = "Data type: dB/dt; UNIT: nT/s\nNumber of stations: 1\nStations: 10\nstation 10\nChannel times\nheader\n1 0.1 4.0\n";
        let survey = RunParams::Survey(SurveyParams {
            filepaths: vec![write(&temp_dir, "line_z.dat", content)],
            json_path: None,
            quiet: true,
        });
        assert!(run(survey).is_ok());

        let params = resample_params(&temp_dir);
        let output_path = params.output_path.clone();
        assert!(run(RunParams::Resample(params)).is_ok());
        assert!(output_path.is_file());

        let missing = RunParams::Survey(SurveyParams {
            filepaths: vec![temp_dir.path().join("missing.tem")],
            json_path: None,
            quiet: true,
        });
        assert!(matches!(run(missing), Err(SurveyError::NotAFile(_))));
    }

    #[test]
    fn test_run_irap_conversion() {
        let temp_dir = tempfile::tempdir().unwrap();
        let group = write(
            &temp_dir,
            "group.txt",
            "Gate times in order of output:\n[0.1,0.2]\nDONE\n\
             $$ MODEL a: Conductance = 5; xdim = 20 ydim = 40\n\
             ### Outputting Rx component: 3 =z\nheader\n0 1.0\n10 2.0\n",
        );

        let outputs = run_irap_conversion(&group).unwrap();
        assert_eq!(outputs, vec![temp_dir.path().join("20x40A.dat")]);

        let records = run_survey(&SurveyParams {
            filepaths: outputs,
            json_path: None,
            quiet: true,
        })
        .unwrap();
        assert_eq!(records[0].format(), FileFormat::Irap);
    }

    #[test]
    fn test_json_output_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let single = temp_dir.path().join("out.json");

        assert_eq!(json_output_path(&single, Path::new("a.tem"), 1).unwrap(), single);
        assert_eq!(
            json_output_path(temp_dir.path(), Path::new("dir/a.tem"), 1).unwrap(),
            temp_dir.path().join("a.json")
        );
    }
}
