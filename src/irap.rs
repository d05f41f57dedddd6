/// IRAP plate-model files
///
/// An IRAP run writes every model of a group into one text file. `convert` splits such a file
/// into one `.dat` file per model, which `parse` then reads:
///
/// ```text
/// Name:A X_Dim:50 Y_Dim:150 Conductance:100
///
/// ### Channel Times ###
/// Start End
/// 0.1 0.2
///
/// ### Data ###
/// Station Component 0
/// -100 Z 1.5
/// ```
///
/// Gate times are in ms.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{parse_f64, Result, SurveyError};
use crate::io;
use crate::maxwell::unique_in_order;
use crate::record::{Channels, FileFormat, Header, ReadingRow, ReadingTable, Readings, SurveyRecord};

/// Prefixes of the four tokens on the first line
pub const HEAD_KEYS: [&str; 4] = ["Name:", "X_Dim:", "Y_Dim:", "Conductance:"];
pub const TIMES_MARKER: &str = "### Channel Times ###";
pub const DATA_MARKER: &str = "### Data ###";

const GATE_TIMES_MARKER: &str = "Gate times in order of output:";
const SECTION_END: &str = "DONE";
const MODEL_MARKER: &str = "$$ MODEL";
const SECTION_MARKER: &str = "###";
const COMPONENT_MARKER: &str = "Outputting Rx component:";

pub fn is_irap_content(content: &str) -> bool {
    content
        .split_whitespace()
        .next()
        .map_or(false, |token| token.starts_with(HEAD_KEYS[0]))
}

pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;
    parse_str(filepath, &content)
}

pub fn parse_str(filepath: &Path, content: &str) -> Result<SurveyRecord> {
    let head = content.lines().next().unwrap_or("").split_whitespace().collect::<Vec<&str>>();
    let mut values = Vec::with_capacity(HEAD_KEYS.len());
    for (i, key) in HEAD_KEYS.iter().enumerate() {
        let value = head
            .get(i)
            .and_then(|token| token.strip_prefix(key))
            .ok_or_else(|| SurveyError::MissingHeaderField(key.trim_end_matches(':').to_string()))?;
        values.push(value.to_string());
    }
    let header = Header::Model {
        name: values[0].clone(),
        x_dim: values[1].clone(),
        y_dim: values[2].clone(),
        conductance: parse_f64(&values[3], "conductance")?,
    };

    let (_, rest) = content
        .split_once(TIMES_MARKER)
        .ok_or_else(|| SurveyError::Format(format!("no '{TIMES_MARKER}' block")))?;
    let (times_text, data_text) = rest
        .split_once(DATA_MARKER)
        .ok_or_else(|| SurveyError::Format(format!("no '{DATA_MARKER}' block")))?;

    let gates = gate_table(times_text)?;
    let (rows, readings) = data_table(data_text, gates.len())?;
    let components = unique_in_order(rows.iter().map(|r| r.component.as_str()));

    SurveyRecord::new(
        filepath,
        FileFormat::Irap,
        header,
        Vec::new(),
        gate_channels(&gates),
        components,
        Readings::Numeric(ReadingTable::new(rows, readings)?),
    )
}

/// (start, end) of each gate. Rows may carry a leading index column.
fn gate_table(text: &str) -> Result<Vec<(f64, f64)>> {
    let gates = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(1)
        .map(|l| {
            let tokens = l.split_whitespace().collect::<Vec<&str>>();
            match tokens.len() {
                2 | 3 => Ok((
                    parse_f64(tokens[tokens.len() - 2], "gate start")?,
                    parse_f64(tokens[tokens.len() - 1], "gate end")?,
                )),
                _ => Err(SurveyError::Format(format!("expected a gate start and end but found '{l}'"))),
            }
        })
        .collect::<Result<Vec<(f64, f64)>>>()?;

    match gates.is_empty() {
        true => Err(SurveyError::EmptyChannelList(TIMES_MARKER.to_string())),
        false => Ok(gates),
    }
}

fn data_table(text: &str, n_channels: usize) -> Result<(Vec<ReadingRow>, Array2<f64>)> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let columns = lines.next().unwrap_or("").split_whitespace().count();
    if columns != n_channels + 2 {
        return Err(SurveyError::Format(format!(
            "the data block has {} channel columns but there are {} gates",
            columns.saturating_sub(2),
            n_channels
        )));
    }

    let lines = lines.collect::<Vec<&str>>();
    let mut rows = Vec::with_capacity(lines.len());
    let mut values = Array2::<f64>::zeros((lines.len(), n_channels));
    for (i, line) in lines.iter().enumerate() {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();
        if tokens.len() != n_channels + 2 {
            return Err(SurveyError::Shape {
                tokens: tokens.len(),
                width: n_channels + 2,
            });
        }
        rows.push(ReadingRow {
            station: parse_f64(tokens[0], "station")?,
            component: tokens[1].to_string(),
            position: None,
            direction_cosines: None,
        });
        for (j, token) in tokens[2..].iter().enumerate() {
            values[[i, j]] = parse_f64(token, &format!("channel {j}"))?;
        }
    }
    Ok((rows, values))
}

fn gate_channels(gates: &[(f64, f64)]) -> Channels {
    Channels::Times {
        times: gates.iter().map(|(start, end)| (start + end) / 2.).collect(),
        widths: Some(gates.iter().map(|(start, end)| end - start).collect()),
    }
}

/// Render a record in the single-model IRAP layout read by `parse`
pub fn render(record: &SurveyRecord) -> Result<String> {
    let Header::Model {
        name,
        x_dim,
        y_dim,
        conductance,
    } = record.header()
    else {
        return Err(SurveyError::Format(format!("a {} record has no plate model", record.format())));
    };
    let (times, widths) = match record.channels() {
        Channels::Times {
            times,
            widths: Some(widths),
        } => (times, widths),
        _ => return Err(SurveyError::Format("IRAP files need channel gates".to_string())),
    };
    let table = record
        .numeric_readings()
        .ok_or_else(|| SurveyError::Format("IRAP files need numeric readings".to_string()))?;

    // Writing to a String cannot fail
    let mut out = String::new();
    let _ = writeln!(out, "Name:{name} X_Dim:{x_dim} Y_Dim:{y_dim} Conductance:{conductance}\n");
    let _ = writeln!(out, "{TIMES_MARKER}\nStart End");
    for (time, width) in times.iter().zip(widths) {
        let _ = writeln!(out, "{:.6} {:.6}", time - width / 2., time + width / 2.);
    }
    let _ = write!(out, "\n{DATA_MARKER}\nStation Component");
    for i in 0..times.len() {
        let _ = write!(out, " {i}");
    }
    out.push('\n');
    for (row, values) in table.rows().iter().zip(table.values().rows()) {
        let _ = write!(out, "{} {}", row.station, row.component);
        for value in values {
            let _ = write!(out, " {value}");
        }
        out.push('\n');
    }
    Ok(out)
}

/// Split the text of a multi-model IRAP run into one record per model.
///
/// Each record's source path is the file it is converted to: "<x_dim>x<y_dim><NAME>.dat" next
/// to `filepath`.
pub fn split_models(filepath: &Path, content: &str) -> Result<Vec<SurveyRecord>> {
    let gate_text = content
        .rsplit_once(GATE_TIMES_MARKER)
        .map(|(_, text)| text)
        .ok_or_else(|| SurveyError::Format(format!("no '{GATE_TIMES_MARKER}' list")))?;
    let gates = gate_text
        .split(SECTION_END)
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(bracketed_gate)
        .collect::<Result<Vec<(f64, f64)>>>()?;
    if gates.is_empty() {
        return Err(SurveyError::EmptyChannelList(GATE_TIMES_MARKER.to_string()));
    }

    let directory = filepath.parent().unwrap_or_else(|| Path::new(""));
    content
        .split(MODEL_MARKER)
        .skip(1)
        .map(|model_text| {
            let model_text = model_text.trim();
            let info = model_text.lines().next().unwrap_or("");
            let name = info.split(':').next().unwrap_or("").trim().to_uppercase();
            let conductance = info
                .split_once("Conductance =")
                .and_then(|(_, rest)| rest.split(';').next())
                .ok_or_else(|| SurveyError::MissingHeaderField("Conductance".to_string()))?;
            let (x_dim, y_dim) = model_dimensions(info)?;

            let mut rows = Vec::new();
            let mut values: Vec<f64> = Vec::new();
            for section in model_text.split(SECTION_MARKER).skip(1) {
                let component = section_component(section)?;
                for line in section.lines().skip(1) {
                    let tokens = line.split_whitespace().collect::<Vec<&str>>();
                    // Short lines are incomplete rows and are dropped
                    if tokens.len() < gates.len() + 1 {
                        continue;
                    }
                    if tokens.len() > gates.len() + 1 {
                        return Err(SurveyError::Shape {
                            tokens: tokens.len(),
                            width: gates.len() + 1,
                        });
                    }
                    rows.push(ReadingRow {
                        station: parse_f64(tokens[0], "station")?,
                        component: component.clone(),
                        position: None,
                        direction_cosines: None,
                    });
                    for token in &tokens[1..] {
                        values.push(parse_f64(token, "reading")?);
                    }
                }
            }
            let readings = Array2::from_shape_vec((rows.len(), gates.len()), values)
                .map_err(|e| SurveyError::Format(e.to_string()))?;
            let components = unique_in_order(rows.iter().map(|r| r.component.as_str()));

            SurveyRecord::new(
                &directory.join(format!("{x_dim}x{y_dim}{name}.dat")),
                FileFormat::Irap,
                Header::Model {
                    name,
                    x_dim,
                    y_dim,
                    conductance: parse_f64(conductance.trim(), "conductance")?,
                },
                Vec::new(),
                gate_channels(&gates),
                components,
                Readings::Numeric(ReadingTable::new(rows, readings)?),
            )
        })
        .collect()
}

/// "[start,end]"
fn bracketed_gate(token: &str) -> Result<(f64, f64)> {
    token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|t| t.split_once(','))
        .ok_or_else(|| SurveyError::Format(format!("expected a gate as '[start,end]' but found '{token}'")))
        .and_then(|(start, end)| Ok((parse_f64(start, "gate start")?, parse_f64(end, "gate end")?)))
}

/// The "xdim = .. ydim = .." pair of a model line, with whitespace removed
fn model_dimensions(info: &str) -> Result<(String, String)> {
    let compact = info.split_whitespace().collect::<String>();
    compact
        .split_once("xdim=")
        .and_then(|(_, rest)| rest.split_once("ydim="))
        .map(|(x, y)| (x.to_string(), y.to_string()))
        .ok_or_else(|| SurveyError::MissingHeaderField("xdim/ydim".to_string()))
}

/// Component letter of an "Outputting Rx component: 3 =z" section
fn section_component(section: &str) -> Result<String> {
    section
        .split_once(COMPONENT_MARKER)
        .and_then(|(_, rest)| rest.split_once('='))
        .and_then(|(_, rest)| rest.chars().next())
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_uppercase().to_string())
        .ok_or_else(|| SurveyError::Format(format!("no '{COMPONENT_MARKER}' in a model section")))
}

/// Write every model of a multi-model IRAP text file as its own `.dat` file
pub fn convert(filepath: &Path) -> Result<Vec<PathBuf>> {
    let content = io::read_survey_text(filepath)?;

    split_models(filepath, &content)?
        .iter()
        .map(|record| {
            let output = record.source_path().to_path_buf();
            std::fs::write(&output, render(record)?)?;
            Ok(output)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_FILE: &str = "Name:A X_Dim:50 Y_Dim:150 Conductance:100

### Channel Times ###
      Start     End
0     0.1       0.2
1     0.2       0.4

### Data ###
Station Component 0 1
-100.0 Z 1.5 0.5
0.0 Z 2.5 1.5
-100.0 X 0.1 0.05
";

    const GROUP_FILE: &str = "IRAP model group
Gate times in order of output:
[0.1,0.2] [0.2,0.4]
DONE
$$ MODEL a: plate Conductance = 100.0; xdim = 50 ydim = 150
### Outputting Rx component: 3 =z
station values
-100 1.5 0.5
0 2.5 1.5

### Outputting Rx component: 1 =x
station values
-100 0.1 0.05
$$ MODEL b: plate Conductance = 10; xdim = 100 ydim = 150
### Outputting Rx component: 3 =z
station values
-100 3 2
";

    #[test]
    fn test_is_irap_content() {
        assert!(is_irap_content(MODEL_FILE));
        assert!(!is_irap_content("Data type: dB/dt; UNIT: nT/s\n"));
        assert!(!is_irap_content(""));
    }

    #[test]
    fn test_parse() {
        let record = parse_str(Path::new("50x150A.dat"), MODEL_FILE).unwrap();

        assert_eq!(record.format(), FileFormat::Irap);
        assert_eq!(record.components(), ["Z", "X"]);
        assert_eq!(
            record.header(),
            &Header::Model {
                name: "A".to_string(),
                x_dim: "50".to_string(),
                y_dim: "150".to_string(),
                conductance: 100.,
            }
        );
        let Channels::Times { times, widths } = record.channels() else {
            panic!("Expected time channels")
        };
        assert!((times[1] - 0.3).abs() < 1e-12);
        assert!((widths.as_ref().unwrap()[0] - 0.1).abs() < 1e-12);

        let (stations, values) = record.numeric_readings().unwrap().component_slice("Z");
        assert_eq!(stations, vec![-100., 0.]);
        assert_eq!(values[[1, 0]], 2.5);
    }

    #[test]
    fn test_parse_errors() {
        let missing_head = MODEL_FILE.replace("Conductance:100", "");
        assert!(matches!(
            parse_str(Path::new("a.dat"), &missing_head),
            Err(SurveyError::MissingHeaderField(_))
        ));

        let wide_header = MODEL_FILE.replace("Station Component 0 1", "Station Component 0 1 2");
        assert!(matches!(parse_str(Path::new("a.dat"), &wide_header), Err(SurveyError::Format(_))));

        let short_row = MODEL_FILE.replace("0.0 Z 2.5 1.5", "0.0 Z 2.5");
        assert!(matches!(parse_str(Path::new("a.dat"), &short_row), Err(SurveyError::Shape { .. })));
    }

    #[test]
    fn test_split_models() {
        let records = split_models(Path::new("runs/group.txt"), GROUP_FILE).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_path(), Path::new("runs/50x150A.dat"));
        assert_eq!(records[1].source_path(), Path::new("runs/100x150B.dat"));
        assert_eq!(records[0].components(), ["Z", "X"]);

        let table = records[0].numeric_readings().unwrap();
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.values()[[2, 1]], 0.05);

        let no_component = GROUP_FILE.replace("Outputting Rx component: 1 =x", "Outputting");
        assert!(split_models(Path::new("group.txt"), &no_component).is_err());
    }

    #[test]
    fn test_convert_then_parse() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("group.txt");
        std::fs::write(&path, GROUP_FILE).unwrap();

        let outputs = convert(&path).unwrap();
        assert_eq!(outputs.len(), 2);

        let record = crate::formats::parse(&outputs[0]).unwrap();
        assert_eq!(record.format(), FileFormat::Irap);
        assert_eq!(record.components(), ["Z", "X"]);
        let Channels::Times { times, .. } = record.channels() else {
            panic!("Expected time channels")
        };
        assert!((times[0] - 0.15).abs() < 1e-9);
        assert_eq!(record.numeric_readings().unwrap().values()[[1, 0]], 2.5);
    }
}
