/// Reader and writer of the TEM-like time decay layout produced from resampled solver output
use std::fmt::Write as _;
use std::path::Path;

use ndarray::{Array2, ArrayView3, Axis};

use crate::error::{parse_f64, Result, SurveyError};
use crate::io;
use crate::maxwell::unique_in_order;
use crate::mun::solution_header;
use crate::record::{Channels, FileFormat, Header, ReadingRow, ReadingTable, Readings, SurveyRecord};

/// Line that separates the channel time list from the readings
pub const DATA_MARKER: &str = "EM data:";
const TIMES_MARKER: &str = "Channel times (ms):";

pub const DEFAULT_DATA_TYPE: &str = "dB/dt";
pub const DEFAULT_UNITS: &str = "nT/s";

/// Build a decay record from a resampled field.
///
/// # Arguments
/// - `field`: Values indexed by (channel, station, component)
/// - `channel_times`: Channel times in seconds. They are stored in ms.
/// - `stations`: One station per receiver
/// - `components`: One label per component of `field`
pub fn record_from_field(
    source_path: &Path,
    field: ArrayView3<f64>,
    channel_times: &[f64],
    stations: &[f64],
    components: &[String],
) -> Result<SurveyRecord> {
    let (n_channels, n_stations, n_components) = field.dim();
    if n_channels != channel_times.len() || n_stations != stations.len() || n_components != components.len() {
        return Err(SurveyError::Format(format!(
            "field of shape {:?} does not match {} channels, {} stations and {} components",
            field.dim(),
            channel_times.len(),
            stations.len(),
            components.len()
        )));
    }

    let mut rows = Vec::with_capacity(n_stations * n_components);
    let mut values = Array2::<f64>::zeros((n_stations * n_components, n_channels));
    for (i, station) in stations.iter().enumerate() {
        for (k, component) in components.iter().enumerate() {
            rows.push(ReadingRow {
                station: *station,
                component: component.clone(),
                position: None,
                direction_cosines: None,
            });
            values
                .row_mut(rows.len() - 1)
                .assign(&field.index_axis(Axis(1), i).index_axis(Axis(1), k));
        }
    }

    SurveyRecord::new(
        source_path,
        FileFormat::Decay,
        Header::Solution {
            data_type: DEFAULT_DATA_TYPE.to_string(),
            units: DEFAULT_UNITS.to_string(),
        },
        Vec::new(),
        Channels::Times {
            times: channel_times.iter().map(|t| t * 1e3).collect(),
            widths: None,
        },
        components.to_vec(),
        Readings::Numeric(ReadingTable::new(rows, values)?),
    )
}

/// Render a record with numeric readings and time channels in the decay layout
pub fn render(record: &SurveyRecord) -> Result<String> {
    let times = record
        .channels()
        .times()
        .ok_or_else(|| SurveyError::Format("only time channel records can be written as decays".to_string()))?;
    let table = record
        .numeric_readings()
        .ok_or_else(|| SurveyError::Format("only numeric readings can be written as decays".to_string()))?;

    let (data_type, units) = match record.header() {
        Header::Solution { data_type, units } => (data_type.as_str(), units.as_str()),
        other => (DEFAULT_DATA_TYPE, other.units()),
    };

    let station_labels = table.rows().iter().map(|row| row.station.to_string()).collect::<Vec<String>>();
    let stations = unique_in_order(station_labels.iter().map(|s| s.as_str()));

    // Writing to a String cannot fail
    let mut out = String::new();
    let _ = writeln!(out, "Data type: {data_type}; UNIT: {units}");
    let _ = writeln!(out, "Number of stations: {}", stations.len());
    let _ = writeln!(out, "Stations (m): {}", stations.join(" "));
    let _ = writeln!(out, "{TIMES_MARKER}");
    for (i, time) in times.iter().enumerate() {
        let _ = writeln!(out, "{:^8} {:.4}", i + 1, time);
    }
    let _ = writeln!(out, "{DATA_MARKER}");

    let _ = write!(out, "{:^8} {:^9}", "Station", "Component");
    for i in 0..times.len() {
        let _ = write!(out, " {:^15}", format!("CH{}", i + 1));
    }
    out.push('\n');

    for (row, values) in table.rows().iter().zip(table.values().rows()) {
        let _ = write!(out, "{:^8} {:^9}", row.station, row.component);
        for value in values {
            let _ = write!(out, " {:^15.5E}", value);
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn write_decay_file(record: &SurveyRecord, filepath: &Path) -> Result<()> {
    std::fs::write(filepath, render(record)?)?;
    Ok(())
}

/// Whether the content looks like a decay file rather than a MUN export
pub fn is_decay_content(content: &str) -> bool {
    content.lines().next().map_or(false, |l| l.contains(crate::mun::DATA_TYPE_MARKER))
        && content.lines().any(|l| l.trim() == DATA_MARKER)
}

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let lines = content.lines().collect::<Vec<&str>>();
    let line = |i: usize| {
        lines
            .get(i)
            .copied()
            .ok_or_else(|| SurveyError::Format(format!("decay file ends before line {}", i + 1)))
    };

    let (data_type, units) = solution_header(line(0)?)?;

    let declared = line(1)?
        .split_once(':')
        .map(|(_, n)| n.trim())
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| SurveyError::Format(format!("no station count in '{}'", lines[1])))?;
    let stations = line(2)?
        .split_once(':')
        .map(|(_, s)| s.split_whitespace().count())
        .unwrap_or(0);
    if stations != declared {
        return Err(SurveyError::StationCount {
            declared,
            found: stations,
        });
    }

    let marker = lines
        .iter()
        .position(|l| l.trim() == DATA_MARKER)
        .ok_or_else(|| SurveyError::Format(format!("no '{DATA_MARKER}' line")))?;

    let times = lines
        .get(4..marker)
        .unwrap_or(&[])
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let tokens = l.split_whitespace().collect::<Vec<&str>>();
            match tokens.len() {
                2 => parse_f64(tokens[1], "channel time"),
                _ => Err(SurveyError::Format(format!("expected '<index> <time>' but found '{}'", l.trim()))),
            }
        })
        .collect::<Result<Vec<f64>>>()?;
    if times.is_empty() {
        return Err(SurveyError::EmptyChannelList(TIMES_MARKER.to_string()));
    }

    let data_lines = lines
        .get(marker + 2..)
        .unwrap_or(&[])
        .iter()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<&&str>>();

    let mut rows = Vec::with_capacity(data_lines.len());
    let mut values = Array2::<f64>::zeros((data_lines.len(), times.len()));
    for (i, l) in data_lines.iter().enumerate() {
        let tokens = l.split_whitespace().collect::<Vec<&str>>();
        if tokens.len() != times.len() + 2 {
            return Err(SurveyError::Format(format!(
                "decay row {} has {} values but there are {} channels",
                i + 1,
                tokens.len().saturating_sub(2),
                times.len()
            )));
        }
        rows.push(ReadingRow {
            station: parse_f64(tokens[0], "station")?,
            component: tokens[1].to_string(),
            position: None,
            direction_cosines: None,
        });
        for (j, token) in tokens[2..].iter().enumerate() {
            values[[i, j]] = parse_f64(token, &format!("CH{}", j + 1))?;
        }
    }

    let components = unique_in_order(rows.iter().map(|r| r.component.as_str()));

    SurveyRecord::new(
        filepath,
        FileFormat::Decay,
        Header::Solution { data_type, units },
        Vec::new(),
        Channels::Times { times, widths: None },
        components,
        Readings::Numeric(ReadingTable::new(rows, values)?),
    )
}
