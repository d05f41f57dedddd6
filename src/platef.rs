/// Parser for PLATEF plate-model forward simulation output
///
/// The format has no markers. Every block is located relative to the data start index given on
/// the second line, so the offsets below are the whole format definition.
use std::path::Path;

use ndarray::Array2;

use crate::error::{parse_f64, parse_station, Result, SurveyError};
use crate::io;
use crate::maxwell::unique_in_order;
use crate::record::{Channels, FileFormat, Header, ReadingRow, ReadingTable, Readings, SurveyRecord};

/// Line holding the data start index as its first token
pub const DATA_START_LINE: usize = 1;
/// First line of the channel time block, counted back from the data start
pub const TIMES_FIRST_OFFSET: usize = 13;
/// One past the last line of the channel time block, counted back from the data start
pub const TIMES_END_OFFSET: usize = 1;
/// Line with the transmitter current (2nd token) and receiver area (3rd token), counted back
/// from the data start. Assumes a fixed number of header lines precede the time block.
pub const CURRENT_OFFSET: usize = 15;
/// Station, component and one unused column precede the channel values in each row
pub const LEADING_COLUMNS: usize = 3;
/// Name of the unused column, kept as an attribute
pub const PLACEHOLDER_COLUMN: &str = "0";

/// PLATEF output is always in dB/dt
pub const UNITS: &str = "nT/s";

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let lines = content.split('\n').collect::<Vec<&str>>();

    let data_start = data_start(&lines)?;
    if data_start < CURRENT_OFFSET || data_start > lines.len() {
        return Err(SurveyError::Format(format!(
            "data start index {data_start} leaves no room for the {CURRENT_OFFSET} header lines before it"
        )));
    }

    let times = channel_times(&lines[data_start - TIMES_FIRST_OFFSET..data_start - TIMES_END_OFFSET])?;
    if times.is_empty() {
        return Err(SurveyError::EmptyChannelList("PLATEF time block".to_string()));
    }

    let current_tokens = lines[data_start - CURRENT_OFFSET].split_whitespace().collect::<Vec<&str>>();
    if current_tokens.len() < 3 {
        return Err(SurveyError::Format(format!(
            "expected current and receiver area on line {} but found '{}'",
            data_start - CURRENT_OFFSET + 1,
            lines[data_start - CURRENT_OFFSET].trim()
        )));
    }
    let current = parse_f64(current_tokens[1], "current")?;
    let rx_area = parse_f64(current_tokens[2], "receiver area")?;

    let table = reading_table(&lines[data_start..], times.len())?;
    let components = unique_in_order(table.rows().iter().map(|r| r.component.as_str()));

    SurveyRecord::new(
        filepath,
        FileFormat::PlateF,
        Header::Plate {
            current,
            rx_area,
            units: UNITS.to_string(),
        },
        Vec::new(),
        // Stored in s in the file
        Channels::Times {
            times: times.iter().map(|t| t * 1000.).collect(),
            widths: None,
        },
        components,
        Readings::Numeric(table),
    )
}

fn data_start(lines: &[&str]) -> Result<usize> {
    let token = lines
        .get(DATA_START_LINE)
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| SurveyError::Format("no data start index on the second line".to_string()))?;

    token
        .parse::<usize>()
        .map_err(|_| SurveyError::Format(format!("data start index '{token}' is not a positive integer")))
}

/// The time values are packed arbitrarily over the block and padded with zeros
pub fn channel_times(block: &[&str]) -> Result<Vec<f64>> {
    Ok(block
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(|token| parse_f64(token, "channel time"))
        .collect::<Result<Vec<f64>>>()?
        .into_iter()
        .filter(|t| *t != 0.)
        .collect())
}

fn reading_table(data_lines: &[&str], n_channels: usize) -> Result<ReadingTable> {
    let tokens = data_lines.iter().flat_map(|line| line.split_whitespace()).collect::<Vec<&str>>();

    let width = n_channels + LEADING_COLUMNS;
    if tokens.len() % width != 0 {
        return Err(SurveyError::Shape {
            tokens: tokens.len(),
            width,
        });
    }

    let n_rows = tokens.len() / width;
    let mut rows = Vec::with_capacity(n_rows);
    let mut values = Array2::<f64>::zeros((n_rows, n_channels));
    let mut placeholder = Array2::<f64>::zeros((n_rows, 1));

    for (i, chunk) in tokens.chunks(width).enumerate() {
        rows.push(ReadingRow {
            station: parse_station(chunk[0])?,
            component: chunk[1].to_string(),
            position: None,
            direction_cosines: None,
        });
        placeholder[[i, 0]] = parse_f64(chunk[2], "placeholder column")?;
        for (j, token) in chunk[LEADING_COLUMNS..].iter().enumerate() {
            values[[i, j]] = parse_f64(token, &format!("channel {}", j + 1))?;
        }
    }

    ReadingTable::with_attributes(rows, values, vec![PLACEHOLDER_COLUMN.to_string()], placeholder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// A file with data starting at line index 20 and five channel times in the time block
    fn synthetic_file(rows: &str) -> String {
        let mut lines: Vec<String> = vec!["PLATEF model output".into(), "20 1 3".into()];
        lines.extend((2..5).map(|i| format!("header line {i}")));
        // Index 5 = 20 - 15
        lines.push("1 250.0 1000.0".into());
        lines.push("header line 6".into());
        // Indices 7 to 18 hold the times, padded with zeros
        lines.push("0.0001 0.0002 0.0004".into());
        lines.push("0.0008 0.0016 0.0".into());
        lines.extend((9..19).map(|_| "0.0 0.0 0.0".to_string()));
        lines.push("end of times".into());
        lines.push(rows.to_string());
        lines.join("\n")
    }

    #[test]
    fn test_zero_padding_is_dropped() {
        let content = synthetic_file(
            "0 Z 0 1 2 3 4 5\n25 Z 0 1.5 2.5 3.5 4.5 5.5\n0 X 0 -1 -2 -3 -4 -5\n",
        );

        let record = parse_str(Path::new("plate.dat"), &content).unwrap();

        assert_eq!(record.channels().len(), 5);
        assert!((record.channels().times().unwrap()[4] - 1.6).abs() < 1e-12);
        assert_eq!(
            record.header(),
            &Header::Plate {
                current: 250.,
                rx_area: 1000.,
                units: "nT/s".to_string()
            }
        );
        assert_eq!(record.components(), ["Z", "X"]);

        let table = record.numeric_readings().unwrap();
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.attribute(PLACEHOLDER_COLUMN).unwrap().to_vec(), vec![0., 0., 0.]);
        let (stations, values) = table.component_slice("Z");
        assert_eq!(stations, vec![0., 25.]);
        assert_eq!(values.row(1), array![1.5, 2.5, 3.5, 4.5, 5.5]);
    }

    #[test]
    fn test_rows_may_wrap_lines() {
        let content = synthetic_file("0 Z 0 1 2\n3 4 5 25 Z 0 1 2 3 4 5");
        let record = parse_str(Path::new("plate.dat"), &content).unwrap();
        assert_eq!(record.numeric_readings().unwrap().rows().len(), 2);
    }

    #[test]
    fn test_shape_error() {
        let content = synthetic_file("0 Z 0 1 2 3 4 5\n25 Z 0 1 2 3 4\n");
        match parse_str(Path::new("plate.dat"), &content) {
            Err(SurveyError::Shape { tokens, width }) => {
                assert_eq!(tokens, 15);
                assert_eq!(width, 8);
            }
            other => panic!("Expected a shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_data_start() {
        let content = synthetic_file("").replacen("20 1 3", "4 1 3", 1);
        assert!(matches!(parse_str(Path::new("plate.dat"), &content), Err(SurveyError::Format(_))));

        let content = synthetic_file("").replacen("20 1 3", "start", 1);
        assert!(parse_str(Path::new("plate.dat"), &content).is_err());
    }
}
