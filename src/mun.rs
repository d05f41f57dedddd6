/// Parser for MUN 3D-solution time decay files
use std::path::Path;

use ndarray::Array2;

use crate::error::{parse_f64, parse_station, Result, SurveyError};
use crate::io;
use crate::record::{Channels, FileFormat, Header, ReadingRow, ReadingTable, Readings, SurveyRecord};

/// Literal that a MUN (and decay) file starts with
pub const DATA_TYPE_MARKER: &str = "Data type:";
const UNIT_PREFIX: &str = "UNIT:";
/// Lines between the per-station preamble and the channel matrix
const LINES_BEFORE_MATRIX: usize = 2;
/// Component assumed when the file name carries no axis suffix
pub const DEFAULT_COMPONENT: &str = "Z";

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

/// Parse a MUN file.
///
/// The matrix is stored channel-major (one line per channel: index, time, one value per station)
/// and is transposed so that rows are stations.
pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let lines = content.split('\n').collect::<Vec<&str>>();
    if lines.len() < 3 {
        return Err(SurveyError::Format("a MUN file needs at least three header lines".to_string()));
    }

    let (data_type, units) = solution_header(lines[0])?;

    let declared = lines[1]
        .split_once(": ")
        .map(|(_, count)| count.trim())
        .ok_or_else(|| SurveyError::Format(format!("no station count in '{}'", lines[1].trim())))?;
    let n_stations = declared
        .parse::<usize>()
        .map_err(|_| SurveyError::Format(format!("station count '{declared}' is not an integer")))?;

    let stations = lines[2]
        .split_once(':')
        .ok_or_else(|| SurveyError::Format(format!("no station ids in '{}'", lines[2].trim())))?
        .1
        .split_whitespace()
        .map(parse_station)
        .collect::<Result<Vec<f64>>>()?;
    if stations.len() != n_stations {
        return Err(SurveyError::StationCount {
            declared: n_stations,
            found: stations.len(),
        });
    }

    let matrix_start = 3 + n_stations + LINES_BEFORE_MATRIX;
    let matrix_lines = match lines.len().checked_sub(1) {
        Some(end) if end > matrix_start => &lines[matrix_start..end],
        _ => &[][..],
    };

    let mut times = Vec::new();
    let mut channel_rows = Vec::new();
    for line in matrix_lines.iter().filter(|l| !l.trim().is_empty()) {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();
        if tokens.len() != n_stations + 2 {
            return Err(SurveyError::StationCount {
                declared: n_stations,
                found: tokens.len().saturating_sub(2),
            });
        }
        times.push(parse_f64(tokens[1], "channel time")?);
        channel_rows.push(
            tokens[2..]
                .iter()
                .map(|v| parse_f64(v, "reading"))
                .collect::<Result<Vec<f64>>>()?,
        );
    }

    let component = component_from_path(filepath);
    let mut values = Array2::<f64>::zeros((n_stations, times.len()));
    for (channel, row) in channel_rows.iter().enumerate() {
        for (station, value) in row.iter().enumerate() {
            values[[station, channel]] = *value;
        }
    }
    let rows = stations
        .iter()
        .map(|station| ReadingRow {
            station: *station,
            component: component.clone(),
            position: None,
            direction_cosines: None,
        })
        .collect();

    SurveyRecord::new(
        filepath,
        FileFormat::Mun,
        Header::Solution { data_type, units },
        Vec::new(),
        Channels::Times { times, widths: None },
        vec![component],
        Readings::Numeric(ReadingTable::new(rows, values)?),
    )
}

/// Split the "Data type: dB/dt; UNIT: nT/s" line shared by MUN and decay files
pub fn solution_header(line: &str) -> Result<(String, String)> {
    let fields = line.trim_end_matches('\r').split("; ").collect::<Vec<&str>>();
    if fields.len() != 2 {
        return Err(SurveyError::Format(format!(
            "expected '<data type>; <units>' on the first line but found '{}'",
            line.trim()
        )));
    }
    let data_type = fields[0].replace(DATA_TYPE_MARKER, "").trim().to_string();
    let units = fields[1].replace(UNIT_PREFIX, "").trim().to_string();
    Ok((data_type, units))
}

/// MUN exports hold one component each, named by a "_x", "_y" or "_z" file name suffix
pub fn component_from_path(filepath: &Path) -> String {
    let stem = filepath
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    match stem.rsplit_once('_').map(|(_, suffix)| suffix) {
        Some("x") => "X".to_string(),
        Some("y") => "Y".to_string(),
        Some("z") => "Z".to_string(),
        _ => DEFAULT_COMPONENT.to_string(),
    }
}
