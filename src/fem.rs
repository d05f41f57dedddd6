/// Parser for Maxwell frequency-domain (FEM) survey files
use std::path::Path;

use crate::error::{Result, SurveyError};
use crate::header::{strip_continuations, HeaderMap};
use crate::io;
use crate::loops::extract_loop_coordinates;
use crate::maxwell::{self, HEADER_LINES};
use crate::record::{Channels, FileFormat, Header, Readings, SurveyRecord, TextTable};

pub const FREQUENCY_MARKER: &str = "/FREQ=";
pub const COMPONENT_BY_FREQUENCY_MARKER: &str = "/COMPONENTBYFREQ=";

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

/// Parse the content of a FEM file. Readings are kept as text and coerced by the consumer.
pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let stripped = strip_continuations(content);
    let lines = stripped.split('\n').collect::<Vec<&str>>();

    let header_map = decode_fem_header(&lines)?;
    let tx_dipole = header_map.flag("TXDIPOLE")?;

    let loop_coordinates = match tx_dipole {
        true => Vec::new(),
        false => extract_loop_coordinates(lines.iter().copied())?,
    };

    let frequencies = maxwell::marker_list(content, FREQUENCY_MARKER, 0)?;
    if frequencies.is_empty() {
        return Err(SurveyError::EmptyFrequencies);
    }

    let (columns, rows) = maxwell::data_block(content)?;
    let mut table = TextTable::new(columns, rows)?;

    let (components, components_by_frequency) = match table.column("COMPONENT") {
        Some(column) => (maxwell::unique_in_order(column), None),
        None => {
            let by_frequency = maxwell::marker_list(content, COMPONENT_BY_FREQUENCY_MARKER, 0)?;
            if by_frequency.len() != frequencies.len() {
                return Err(SurveyError::Format(format!(
                    "{} frequencies but {} components by frequency",
                    frequencies.len(),
                    by_frequency.len()
                )));
            }
            match by_frequency.iter().all(|c| c == &by_frequency[0]) {
                true => {
                    table.push_constant_column("COMPONENT", &by_frequency[0]);
                    (vec![by_frequency[0].clone()], None)
                }
                false => {
                    let components = maxwell::unique_in_order(by_frequency.iter().map(|c| c.as_str()));
                    table.push_constant_column("COMPONENT", &components.join(", "));
                    (components, Some(by_frequency))
                }
            }
        }
    };

    let header = maxwell::instrument_header(header_map, FileFormat::Fem, &components)?;

    SurveyRecord::new(
        filepath,
        FileFormat::Fem,
        Header::Instrument(header),
        loop_coordinates,
        Channels::Frequencies {
            labels: frequencies,
            components: components_by_frequency,
        },
        components,
        Readings::Text(table),
    )
}

/// The second header line is skipped when it names a loop, since loop names may contain spaces.
fn decode_fem_header(lines: &[&str]) -> Result<HeaderMap> {
    let line = |i: usize| {
        lines
            .get(i)
            .copied()
            .ok_or_else(|| SurveyError::Format(format!("file ends before header line {}", i + 1)))
    };

    let mut header = HeaderMap::default();
    header.extend_from_line(line(HEADER_LINES[0])?)?;

    let second = line(HEADER_LINES[1])?;
    if !second.to_lowercase().contains("loop") {
        header.extend_from_line(second)?;
    }
    Ok(header)
}
