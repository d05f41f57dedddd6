use crate::pipeline::{ResampleParams, RunParams, SurveyParams};
use crate::resample::{ResampleMode, ResampleOptions};
use crate::{pipeline, tools};
/// Functions to handle the command line interface (CLI)
use clap::Parser;
use log::warn;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(
        clap::ArgGroup::new("input_choice")
        .required(true)
        .args(&["filepath", "field", "convert_irap"]),
    ))
]
pub struct Args {
    /// Filepath of a survey file (.fem, .tem or .dat) or a glob pattern of many files
    #[clap(short, long)]
    filepath: Option<String>,

    /// Split a multi-model IRAP text file into one IRAP .dat file per model, saved next to it
    #[clap(long)]
    convert_irap: Option<PathBuf>,

    /// Export the parsed survey files as JSON. Must be a directory if many files are given.
    #[clap(long)]
    json: Option<PathBuf>,

    /// Raw solver output to resample: one line per receiver and time step
    #[clap(long)]
    field: Option<PathBuf>,

    /// Time stepping scheme of the solver output. The third column holds the times (s).
    #[clap(long)]
    times: Option<PathBuf>,

    /// Channel times (s) to resample at, separated by commas. Can be a filepath to a newline separated file.
    #[clap(long)]
    channels: Option<String>,

    /// Number of receivers in the solver output
    #[clap(long)]
    receivers: Option<usize>,

    /// Number of field components per receiver
    #[clap(long, default_value = "3")]
    components: usize,

    /// Observation file with the station offset of each receiver. Stations are numbered from 1 if not given.
    #[clap(long)]
    observations: Option<PathBuf>,

    /// Column (1-based) of the station offsets in the observation file
    #[clap(long, default_value = "2")]
    observation_column: usize,

    /// Use a spline through every modelling time instead of the nearest time step
    #[clap(long)]
    interp: bool,

    /// Degree of the interpolating spline (1 or 3)
    #[clap(long, default_value = "3")]
    degree: usize,

    /// Target residual sum of squares of the spline. Zero interpolates exactly.
    #[clap(long, default_value = "0")]
    smoothing: f64,

    /// Only use the time steps of the off-time
    #[clap(long)]
    only_offtime: bool,

    /// Shift (s) added to the modelling times before resampling
    #[clap(long)]
    zero_time_shift: Option<f64>,

    /// Output decay file of the resampled solver output
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Suppress progress messages
    #[clap(short, long)]
    quiet: bool,
}

enum ParsedArgs {
    Params(Box<RunParams>),
    Error(String),
}

impl Args {
    /// Whether progress messages should be hidden
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    fn parse(&self) -> ParsedArgs {
        if let Some(filepath) = &self.convert_irap {
            return ParsedArgs::Params(Box::new(RunParams::ConvertIrap(filepath.clone())));
        }

        if let Some(pattern) = &self.filepath {
            let paths = match glob::glob(pattern) {
                Ok(paths) => paths,
                Err(e) => return ParsedArgs::Error(format!("Invalid filepath pattern {}: {}", pattern, e)),
            };
            let mut filepaths = Vec::<PathBuf>::new();
            for path in paths {
                match path {
                    Ok(p) => filepaths.push(p),
                    Err(e) => return ParsedArgs::Error(format!("Could not read path: {}", e)),
                }
            }
            if filepaths.is_empty() {
                return ParsedArgs::Error(format!("No files matched: {}", pattern));
            }
            if filepaths.len() > 1 {
                if let Some(json) = &self.json {
                    if json.is_file() {
                        return ParsedArgs::Error(format!(
                            "--json must be a directory when {} files are given: {:?}",
                            filepaths.len(),
                            json
                        ));
                    }
                }
            }

            return ParsedArgs::Params(Box::new(RunParams::Survey(SurveyParams {
                filepaths,
                json_path: self.json.clone(),
                quiet: self.quiet,
            })));
        }

        let field_path = match &self.field {
            Some(p) => p.clone(),
            None => {
                return ParsedArgs::Error(
                    "No filepath given.\nUse the help text (\"-h\" or \"--help\") for assistance.".to_string(),
                )
            }
        };

        // The rest of the resampling arguments have no sensible defaults
        let (times_path, channels, n_rec, output_path) = match (&self.times, &self.channels, self.receivers, &self.output)
        {
            (Some(t), Some(c), Some(r), Some(o)) => (t.clone(), c, r, o.clone()),
            _ => {
                return ParsedArgs::Error(
                    "--field requires --times, --channels, --receivers and --output".to_string(),
                )
            }
        };
        let channels = match tools::parse_channel_list(channels) {
            Ok(c) => c,
            Err(e) => return ParsedArgs::Error(e),
        };
        if n_rec == 0 || self.components == 0 {
            return ParsedArgs::Error("--receivers and --components must be at least 1".to_string());
        }

        let mode = match self.interp {
            true => ResampleMode::Spline {
                degree: self.degree,
                smoothing: self.smoothing,
            },
            false => {
                if self.degree != 3 || self.smoothing != 0. {
                    warn!("--degree and --smoothing only apply with --interp. Using the nearest time step.");
                }
                ResampleMode::Nearest
            }
        };

        ParsedArgs::Params(Box::new(RunParams::Resample(ResampleParams {
            field_path,
            times_path,
            channels,
            n_rec,
            n_comp: self.components,
            observations: self.observations.clone(),
            observation_column: self.observation_column,
            mode,
            options: ResampleOptions {
                only_offtime: self.only_offtime,
                zero_time_shift: self.zero_time_shift,
            },
            output_path,
        })))
    }
}

/// Run the main CLI functionality based on the given arguments
///
/// # Arguments
/// - `arguments`: The Args object containing the parsed arguments.
///
/// # Returns
/// The appropriate exit code.
pub fn main(arguments: Args) -> i32 {
    match arguments.parse() {
        ParsedArgs::Params(params) => match pipeline::run(*params) {
            Ok(_) => 0,
            Err(e) => error(&format!("{e}"), 1),
        },
        ParsedArgs::Error(message) => error(&message, 1),
    }
}

/// Print an error to /dev/stderr and return an exit code
///
/// # Arguments
/// - `message`: The message to print to /dev/stderr
/// - `code`: The exit code
///
/// # Returns
/// The same exit code that was provided
fn error(message: &str, code: i32) -> i32 {
    eprintln!("{}", message);
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ParsedArgs {
        Args::try_parse_from(std::iter::once("emsurvey").chain(args.iter().copied()))
            .unwrap()
            .parse()
    }

    #[test]
    fn test_requires_an_input() {
        assert!(Args::try_parse_from(["emsurvey", "--quiet"]).is_err());
        assert!(Args::try_parse_from(["emsurvey", "-f", "a.tem", "--field", "dbdt"]).is_err());
        assert!(Args::try_parse_from(["emsurvey", "-f", "a.tem", "--convert-irap", "group.txt"]).is_err());
    }

    #[test]
    fn test_convert_irap_args() {
        match parse(&["--convert-irap", "group.txt"]) {
            ParsedArgs::Params(params) => match *params {
                RunParams::ConvertIrap(path) => assert_eq!(path, PathBuf::from("group.txt")),
                other => panic!("Expected conversion params, got {:?}", other),
            },
            ParsedArgs::Error(e) => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn test_survey_glob() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["a.tem", "b.tem"] {
            std::fs::write(temp_dir.path().join(name), "").unwrap();
        }
        let pattern = temp_dir.path().join("*.tem");

        match parse(&["-f", pattern.to_str().unwrap()]) {
            ParsedArgs::Params(params) => match *params {
                RunParams::Survey(p) => assert_eq!(p.filepaths.len(), 2),
                other => panic!("Expected survey params, got {:?}", other),
            },
            _ => panic!("Expected params"),
        }

        let missing = temp_dir.path().join("*.fem");
        assert!(matches!(parse(&["-f", missing.to_str().unwrap()]), ParsedArgs::Error(_)));
    }

    #[test]
    fn test_resample_args() {
        let base = [
            "--field", "dbdt", "--times", "scheme", "--channels", "1e-4,2e-4", "--receivers", "4", "-o", "out.dat",
        ];

        match parse(&base) {
            ParsedArgs::Params(params) => match *params {
                RunParams::Resample(p) => {
                    assert_eq!(p.channels, vec![1e-4, 2e-4]);
                    assert_eq!(p.n_rec, 4);
                    assert_eq!(p.n_comp, 3);
                    assert_eq!(p.observation_column, 2);
                    assert_eq!(p.mode, ResampleMode::Nearest);
                    assert_eq!(p.options, ResampleOptions::default());
                }
                other => panic!("Expected resample params, got {:?}", other),
            },
            _ => panic!("Expected params"),
        }

        let mut args = base.to_vec();
        args.extend(["--interp", "--degree", "1", "--only-offtime", "--zero-time-shift", "1e-5"]);
        match parse(&args) {
            ParsedArgs::Params(params) => match *params {
                RunParams::Resample(p) => {
                    assert_eq!(
                        p.mode,
                        ResampleMode::Spline {
                            degree: 1,
                            smoothing: 0.
                        }
                    );
                    assert!(p.options.only_offtime);
                    assert_eq!(p.options.zero_time_shift, Some(1e-5));
                }
                other => panic!("Expected resample params, got {:?}", other),
            },
            _ => panic!("Expected params"),
        }

        assert!(matches!(parse(&base[..8]), ParsedArgs::Error(_)));
        assert!(matches!(
            parse(&["--field", "dbdt", "--times", "s", "--channels", "x", "--receivers", "4", "-o", "o"]),
            ParsedArgs::Error(_)
        ));
    }

    #[test]
    fn test_spline_options_without_interp() {
        let mut args = vec![
            "--field", "dbdt", "--times", "scheme", "--channels", "1e-4", "--receivers", "1", "-o", "out.dat",
        ];
        args.extend(["--degree", "1", "--smoothing", "0.5"]);

        // Warned about, then ignored
        match parse(&args) {
            ParsedArgs::Params(params) => match *params {
                RunParams::Resample(p) => assert_eq!(p.mode, ResampleMode::Nearest),
                other => panic!("Expected resample params, got {:?}", other),
            },
            ParsedArgs::Error(e) => panic!("Unexpected error: {}", e),
        }
    }
}
