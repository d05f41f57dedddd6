//! Readers for electromagnetic survey files (FEM, TEM, PLATEF, MUN, IRAP and decay files) and
//! resampling of time-domain solver output to instrument channel times.
pub mod cli;
pub mod decay;
pub mod error;
pub mod fem;
pub mod formats;
pub mod header;
pub mod io;
pub mod irap;
pub mod loops;
pub mod maxwell;
pub mod mun;
pub mod pipeline;
pub mod platef;
pub mod record;
pub mod resample;
pub mod spline;
pub mod tem;
pub mod tools;
pub mod waveform;

pub use error::{Result, SurveyError};
pub use record::SurveyRecord;

const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");
const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROGRAM_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
