/// Parser for Maxwell time-domain (TEM) survey files
use std::path::Path;

use ndarray::Array2;

use crate::error::{parse_f64, parse_station, Result, SurveyError};
use crate::header::{decode_header, strip_continuations};
use crate::io;
use crate::loops::extract_loop_coordinates;
use crate::maxwell::{self, HEADER_LINES};
use crate::record::{Channels, FileFormat, Header, Position, ReadingRow, ReadingTable, Readings, SurveyRecord};

pub const TIMES_MARKER: &str = "/TIMES(";
pub const WIDTHS_MARKER: &str = "/TIMESWIDTH(";
/// Length of the unit suffix between the list markers and the values, e.g. "ms)="
pub const UNIT_PREFIX_CHARS: usize = 4;

/// Positional columns that precede the channel readings
const N_LEADING_COLUMNS: usize = 5;
const DIRECTION_COSINE_COLUMNS: [&str; 3] = ["DIRCOSZ", "DIRCOSE", "DIRCOSN"];

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let stripped = strip_continuations(content);
    let lines = stripped.split('\n').collect::<Vec<&str>>();

    let header_lines = HEADER_LINES
        .iter()
        .map(|i| {
            lines
                .get(*i)
                .copied()
                .ok_or_else(|| SurveyError::Format(format!("file ends before header line {}", i + 1)))
        })
        .collect::<Result<Vec<&str>>>()?;
    let header_map = decode_header(&header_lines)?;

    let loop_coordinates = match header_map.flag("TXDIPOLE")? {
        true => Vec::new(),
        false => extract_loop_coordinates(lines.iter().copied())?,
    };

    let times = channel_list(content, TIMES_MARKER)?;
    let widths = channel_list(content, WIDTHS_MARKER)?;
    if times.len() != widths.len() {
        return Err(SurveyError::Format(format!(
            "{} channel times but {} channel widths",
            times.len(),
            widths.len()
        )));
    }

    let (columns, raw_rows) = maxwell::data_block(content)?;
    let table = reading_table(&columns, &raw_rows, times.len())?;

    let components = maxwell::unique_in_order(table.rows().iter().map(|r| r.component.as_str()));
    let header = maxwell::instrument_header(header_map, FileFormat::Tem, &components)?;

    SurveyRecord::new(
        filepath,
        FileFormat::Tem,
        Header::Instrument(header),
        loop_coordinates,
        Channels::Times {
            times,
            widths: Some(widths),
        },
        components,
        Readings::Numeric(table),
    )
}

fn channel_list(content: &str, marker: &str) -> Result<Vec<f64>> {
    let values = maxwell::marker_list(content, marker, UNIT_PREFIX_CHARS)?
        .iter()
        .map(|v| parse_f64(v, marker))
        .collect::<Result<Vec<f64>>>()?;

    match values.is_empty() {
        true => Err(SurveyError::EmptyChannelList(marker.to_string())),
        false => Ok(values),
    }
}

/// Coerce the raw data block: position, station, component, then the named channel columns.
fn reading_table(columns: &[String], raw_rows: &[Vec<String>], n_channels: usize) -> Result<ReadingTable> {
    if columns.len() < N_LEADING_COLUMNS {
        return Err(SurveyError::Format(format!(
            "expected at least {N_LEADING_COLUMNS} data columns but found {}",
            columns.len()
        )));
    }
    let index_of = |name: &str| columns.iter().position(|c| c == name);

    let channel_indices = (1..=n_channels)
        .map(|i| {
            let name = format!("CH{i}");
            index_of(&name).ok_or_else(|| SurveyError::Format(format!("no data column named {name}")))
        })
        .collect::<Result<Vec<usize>>>()?;

    let cosine_indices = DIRECTION_COSINE_COLUMNS.iter().map(|c| index_of(c)).collect::<Option<Vec<usize>>>();

    let attribute_indices = (N_LEADING_COLUMNS..columns.len())
        .filter(|i| !channel_indices.contains(i))
        .filter(|i| !DIRECTION_COSINE_COLUMNS.contains(&columns[*i].as_str()))
        .collect::<Vec<usize>>();

    let mut rows = Vec::with_capacity(raw_rows.len());
    let mut values = Array2::<f64>::zeros((raw_rows.len(), n_channels));
    let mut attributes = Array2::<f64>::zeros((raw_rows.len(), attribute_indices.len()));

    for (i, raw) in raw_rows.iter().enumerate() {
        if raw.len() != columns.len() {
            return Err(SurveyError::Format(format!(
                "data row {} has {} values but there are {} column names",
                i + 1,
                raw.len(),
                columns.len()
            )));
        }

        let direction_cosines = match &cosine_indices {
            Some(idx) => Some([
                parse_f64(&raw[idx[0]], &columns[idx[0]])?,
                parse_f64(&raw[idx[1]], &columns[idx[1]])?,
                parse_f64(&raw[idx[2]], &columns[idx[2]])?,
            ]),
            None => None,
        };

        rows.push(ReadingRow {
            station: parse_station(&raw[3])?,
            component: raw[4].clone(),
            position: Some(Position {
                easting: parse_f64(&raw[0], &columns[0])?,
                northing: parse_f64(&raw[1], &columns[1])?,
                elevation: parse_f64(&raw[2], &columns[2])?,
            }),
            direction_cosines,
        });

        for (j, col) in channel_indices.iter().enumerate() {
            values[[i, j]] = parse_f64(&raw[*col], &columns[*col])?;
        }
        for (j, col) in attribute_indices.iter().enumerate() {
            attributes[[i, j]] = parse_f64(&raw[*col], &columns[*col])?;
        }
    }

    let attribute_names = attribute_indices.iter().map(|i| columns[*i].clone()).collect();
    ReadingTable::with_attributes(rows, values, attribute_names, attributes)
}
