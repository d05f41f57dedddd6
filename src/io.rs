use std::path::Path;

use ndarray::{Array1, Array3};
use serde::Serialize;

use crate::error::{parse_f64, Result, SurveyError};
use crate::record::SurveyRecord;
use crate::resample::ModelTimes;

/// Column of the time stepping scheme with t = 0 at the start of the off-time
const MODEL_TIME_COLUMN: usize = 2;

/// Read a whole survey file. A path that is not a file is reported before anything else.
pub fn read_survey_text(filepath: &Path) -> Result<String> {
    if !filepath.is_file() {
        return Err(SurveyError::NotAFile(filepath.to_path_buf()));
    }
    Ok(std::fs::read_to_string(filepath)?)
}

/// Load a whitespace separated table of numbers. Text after '#' and blank lines are skipped.
pub fn load_numeric_table(filepath: &Path) -> Result<Vec<Vec<f64>>> {
    let content = read_survey_text(filepath)?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let data = line.split('#').next().unwrap_or("").trim();
        if data.is_empty() {
            continue;
        }
        let row = data
            .split_whitespace()
            .map(|token| parse_f64(token, &format!("value on line {}", i + 1)))
            .collect::<Result<Vec<f64>>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(SurveyError::Format(format!(
                    "line {} of {:?} has {} columns but the table has {}",
                    i + 1,
                    filepath,
                    row.len(),
                    first.len()
                )));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Load the modelling times (s) of a time stepping scheme
pub fn load_time_stepping_scheme(filepath: &Path) -> Result<ModelTimes> {
    let rows = load_numeric_table(filepath)?;

    let times = rows
        .iter()
        .map(|row| {
            row.get(MODEL_TIME_COLUMN).copied().ok_or_else(|| {
                SurveyError::Format(format!(
                    "the time stepping scheme {:?} needs at least {} columns",
                    filepath,
                    MODEL_TIME_COLUMN + 1
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    ModelTimes::new(Array1::from_vec(times))
}

/// Load raw solver output into `field[step, receiver, component]`.
///
/// The file holds one line per receiver and step, all receivers of one step before the next.
pub fn load_field(filepath: &Path, n_rec: usize, n_comp: usize) -> Result<Array3<f64>> {
    let rows = load_numeric_table(filepath)?;

    if n_rec == 0 || rows.len() % n_rec != 0 {
        return Err(SurveyError::Format(format!(
            "{} field rows cannot be split into steps of {} receivers",
            rows.len(),
            n_rec
        )));
    }
    if let Some(row) = rows.first() {
        if row.len() != n_comp {
            return Err(SurveyError::Format(format!(
                "the field file has {} columns but {} components were expected",
                row.len(),
                n_comp
            )));
        }
    }

    let n_step = rows.len() / n_rec;
    Array3::from_shape_vec((n_step, n_rec, n_comp), rows.into_iter().flatten().collect())
        .map_err(|e| SurveyError::Format(e.to_string()))
}

/// Load the receiver positions along the line from the 1-based `column` of a table
pub fn load_observation_line(filepath: &Path, column: usize) -> Result<Array1<f64>> {
    let rows = load_numeric_table(filepath)?;
    let n_columns = rows.first().map(|r| r.len()).unwrap_or(0);

    if column < 1 || column > n_columns {
        return Err(SurveyError::Format(format!(
            "column {} is outside the {} columns of {:?}",
            column, n_columns, filepath
        )));
    }
    Ok(rows.iter().map(|row| row[column - 1]).collect())
}

#[derive(Serialize)]
struct Export<'a> {
    program_version: String,
    processing_datetime: String,
    record: &'a SurveyRecord,
}

/// Export a parsed record as JSON, stamped with the program version and processing time
pub fn export_json(record: &SurveyRecord, json_filepath: &Path) -> Result<()> {
    if json_filepath.is_file() {
        std::fs::remove_file(json_filepath)?;
    };

    let export = Export {
        program_version: format!(
            "{} version {}, © {}",
            crate::PROGRAM_NAME,
            crate::PROGRAM_VERSION,
            crate::PROGRAM_AUTHORS
        ),
        processing_datetime: chrono::Local::now().to_rfc3339(),
        record,
    };

    let file = std::io::BufWriter::new(std::fs::File::create(json_filepath)?);
    serde_json::to_writer_pretty(file, &export)?;
    Ok(())
}
