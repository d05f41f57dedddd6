/// Errors raised while parsing survey files or resampling solver output
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurveyError {
    #[error("{0:?} is not a file")]
    NotAFile(PathBuf),
    #[error("required header field '{0}' is missing")]
    MissingHeaderField(String),
    #[error("no frequencies found after the /FREQ= marker")]
    EmptyFrequencies,
    #[error("empty channel list after the {0} marker")]
    EmptyChannelList(String),
    #[error("format error: {0}")]
    Format(String),
    #[error("{tokens} data tokens cannot be split into rows of {width} columns")]
    Shape { tokens: usize, width: usize },
    #[error("{declared} stations declared but {found} station ids given")]
    StationCount { declared: usize, found: usize },
    #[error("time channel {target} s is outside the modelled time range [{min}, {max}] s")]
    OutOfRange { target: f64, min: f64, max: f64 },
    #[error("waveform type {0} is not supported")]
    UnsupportedWaveform(u8),
    #[error("time {time} is outside the half period [0, {limit}]")]
    WaveformDomain { time: f64, limit: f64 },
    #[error("spline error: {0}")]
    Spline(String),
    #[error("no parser is registered for {0:?}")]
    UnknownFormat(PathBuf),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
    #[error("json export error")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SurveyError>;

/// Parse a float token, naming the token in the error
pub fn parse_f64(token: &str, what: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| SurveyError::Format(format!("could not parse {what} '{token}' as a number")))
}

/// Parse an integer-like token the way the instrument files write them ("12" or "12.0")
pub fn parse_station(token: &str) -> Result<f64> {
    Ok(parse_f64(token, "station")?.trunc())
}
