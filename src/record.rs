/// The normalized representation shared by all survey file parsers
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::error::{parse_f64, Result, SurveyError};

/// Axes for which a receiver area can be given in the instrument header
pub const RECEIVER_AXES: [&str; 3] = ["X", "Y", "Z"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    Fem,
    Tem,
    PlateF,
    Mun,
    Decay,
    Irap,
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileFormat::Fem => "Maxwell FEM",
            FileFormat::Tem => "Maxwell TEM",
            FileFormat::PlateF => "PLATEF",
            FileFormat::Mun => "MUN 3D solution",
            FileFormat::Decay => "Time decay",
            FileFormat::Irap => "IRAP plate model",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct LoopVertex {
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReceiverArea {
    /// Point receiver; only the HCP area applies.
    Dipole { hcp: Option<String> },
    /// Loop receiver with one area per measured axis.
    PerAxis {
        x: Option<String>,
        y: Option<String>,
        z: Option<String>,
    },
}

impl ReceiverArea {
    pub fn axis(&self, axis: &str) -> Option<&str> {
        match self {
            ReceiverArea::Dipole { .. } => None,
            ReceiverArea::PerAxis { x, y, z } => match axis {
                "X" => x.as_deref(),
                "Y" => y.as_deref(),
                "Z" => z.as_deref(),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Transmitter {
    Dipole { moment: String },
    Loop { turns: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Separation {
    pub horizontal: String,
    pub vertical: String,
}

/// Transmitter timing fields of a TEM header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timing {
    pub base_frequency: String,
    pub duty_cycle: String,
    pub on_time: String,
    pub off_time: String,
    pub turn_on: String,
    pub turn_off: String,
    pub timing_mark: String,
}

/// Header of a Maxwell FEM or TEM file
///
/// Values are kept as text; numeric coercion differs per field and is left to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentHeader {
    pub line: String,
    pub config: String,
    pub elevation: String,
    pub units: String,
    pub current: String,
    pub receiver: ReceiverArea,
    pub transmitter: Transmitter,
    pub separation: Option<Separation>,
    pub timing: Option<Timing>,
    /// Every decoded KEY:VALUE pair, including ones not lifted into fields
    pub fields: BTreeMap<String, String>,
}

impl InstrumentHeader {
    pub fn rx_dipole(&self) -> bool {
        matches!(self.receiver, ReceiverArea::Dipole { .. })
    }

    pub fn tx_dipole(&self) -> bool {
        matches!(self.transmitter, Transmitter::Dipole { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Header {
    Instrument(InstrumentHeader),
    Plate {
        current: f64,
        rx_area: f64,
        units: String,
    },
    Solution {
        data_type: String,
        units: String,
    },
    /// Plate model of an IRAP run. The files carry no units.
    Model {
        name: String,
        x_dim: String,
        y_dim: String,
        conductance: f64,
    },
}

impl Header {
    pub fn units(&self) -> &str {
        match self {
            Header::Instrument(header) => &header.units,
            Header::Plate { units, .. } => units,
            Header::Solution { units, .. } => units,
            Header::Model { .. } => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Channels {
    /// FEM frequency labels. `components` is set when each frequency belongs to its own component.
    Frequencies {
        labels: Vec<String>,
        components: Option<Vec<String>>,
    },
    /// Channel times in ms, with gate widths when the format has them.
    Times {
        times: Vec<f64>,
        widths: Option<Vec<f64>>,
    },
}

impl Channels {
    pub fn len(&self) -> usize {
        match self {
            Channels::Frequencies { labels, .. } => labels.len(),
            Channels::Times { times, .. } => times.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn times(&self) -> Option<&[f64]> {
        match self {
            Channels::Times { times, .. } => Some(times),
            Channels::Frequencies { .. } => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Position {
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRow {
    pub station: f64,
    pub component: String,
    pub position: Option<Position>,
    /// Direction cosines in (z, east, north) order
    pub direction_cosines: Option<[f64; 3]>,
}

/// Numeric readings: one row per (station, component), one column per channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingTable {
    rows: Vec<ReadingRow>,
    values: Array2<f64>,
    attribute_names: Vec<String>,
    attributes: Array2<f64>,
}

impl ReadingTable {
    pub fn new(rows: Vec<ReadingRow>, values: Array2<f64>) -> Result<ReadingTable> {
        let n_rows = rows.len();
        ReadingTable::with_attributes(rows, values, Vec::new(), Array2::zeros((n_rows, 0)))
    }

    /// Create a table that also carries named per-row numeric columns that are not channels
    pub fn with_attributes(
        rows: Vec<ReadingRow>,
        values: Array2<f64>,
        attribute_names: Vec<String>,
        attributes: Array2<f64>,
    ) -> Result<ReadingTable> {
        if values.nrows() != rows.len() || attributes.nrows() != rows.len() {
            return Err(SurveyError::Format(format!(
                "{} rows given but the value matrix has {} and the attribute matrix {}",
                rows.len(),
                values.nrows(),
                attributes.nrows()
            )));
        }
        if attributes.ncols() != attribute_names.len() {
            return Err(SurveyError::Format(format!(
                "{} attribute names for {} attribute columns",
                attribute_names.len(),
                attributes.ncols()
            )));
        }
        Ok(ReadingTable {
            rows,
            values,
            attribute_names,
            attributes,
        })
    }

    pub fn rows(&self) -> &[ReadingRow] {
        &self.rows
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.attribute_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.attributes.column(i))
    }

    pub fn n_channels(&self) -> usize {
        self.values.ncols()
    }

    /// Stations and per-channel values of one component, in file order
    pub fn component_slice(&self, component: &str) -> (Vec<f64>, Array2<f64>) {
        let indices = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.component == component)
            .map(|(i, _)| i)
            .collect::<Vec<usize>>();

        let stations = indices.iter().map(|i| self.rows[*i].station).collect();
        (stations, self.values.select(Axis(0), &indices))
    }
}

/// Readings kept as text with named columns (FEM); numeric coercion happens on access
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<TextTable> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SurveyError::Format(format!(
                    "data row {} has {} values but there are {} column names",
                    i + 1,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(TextTable { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Coerce a column to floats. Unparsable cells are reported, not skipped.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        self.column(name)
            .ok_or_else(|| SurveyError::Format(format!("no column named '{name}'")))?
            .into_iter()
            .map(|cell| parse_f64(cell, name))
            .collect()
    }

    pub(crate) fn push_constant_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in self.rows.iter_mut() {
            row.push(value.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Readings {
    Text(TextTable),
    Numeric(ReadingTable),
}

/// One parsed survey file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
    source_path: PathBuf,
    format: FileFormat,
    header: Header,
    loop_coordinates: Vec<LoopVertex>,
    channels: Channels,
    components: Vec<String>,
    readings: Readings,
}

impl SurveyRecord {
    /// Assemble a record, checking that the parts agree with each other
    pub fn new(
        source_path: &Path,
        format: FileFormat,
        header: Header,
        loop_coordinates: Vec<LoopVertex>,
        channels: Channels,
        components: Vec<String>,
        readings: Readings,
    ) -> Result<SurveyRecord> {
        let record = SurveyRecord {
            source_path: source_path.to_path_buf(),
            format,
            header,
            loop_coordinates,
            channels,
            components,
            readings,
        };
        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<()> {
        match &self.header {
            Header::Instrument(header) => {
                if header.tx_dipole() && !self.loop_coordinates.is_empty() {
                    return Err(SurveyError::Format(
                        "a dipole transmitter cannot have loop coordinates".to_string(),
                    ));
                }
                if let ReceiverArea::PerAxis { .. } = header.receiver {
                    for axis in RECEIVER_AXES {
                        if self.components.iter().any(|c| c == axis) && header.receiver.axis(axis).is_none() {
                            return Err(SurveyError::MissingHeaderField(format!("RXAREA{axis}")));
                        }
                    }
                }
            }
            _ => {
                if !self.loop_coordinates.is_empty() {
                    return Err(SurveyError::Format(format!(
                        "{} files do not carry loop coordinates",
                        self.format
                    )));
                }
            }
        }

        match &self.readings {
            Readings::Numeric(table) => {
                if table.n_channels() != self.channels.len() {
                    return Err(SurveyError::Format(format!(
                        "{} channels but the readings have {} values per row",
                        self.channels.len(),
                        table.n_channels()
                    )));
                }
                let mut seen: HashSet<(u64, &str)> = HashSet::new();
                for row in table.rows() {
                    if !self.components.contains(&row.component) {
                        return Err(SurveyError::Format(format!(
                            "component '{}' is not among the record components",
                            row.component
                        )));
                    }
                    if !seen.insert((row.station.to_bits(), row.component.as_str())) {
                        return Err(SurveyError::Format(format!(
                            "station {} appears more than once in component {}",
                            row.station, row.component
                        )));
                    }
                }
            }
            Readings::Text(table) => {
                let by_frequency = matches!(
                    self.channels,
                    Channels::Frequencies {
                        components: Some(_),
                        ..
                    }
                );
                if let (false, Some(column)) = (by_frequency, table.column("COMPONENT")) {
                    if let Some(unknown) = column.iter().find(|c| !self.components.iter().any(|k| k == *c)) {
                        return Err(SurveyError::Format(format!(
                            "component '{unknown}' is not among the record components"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn loop_coordinates(&self) -> &[LoopVertex] {
        &self.loop_coordinates
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn numeric_readings(&self) -> Option<&ReadingTable> {
        match &self.readings {
            Readings::Numeric(table) => Some(table),
            Readings::Text(_) => None,
        }
    }

    fn station_range(&self) -> Option<(f64, f64)> {
        let stations: Vec<f64> = match &self.readings {
            Readings::Numeric(table) => table.rows().iter().map(|r| r.station).collect(),
            Readings::Text(table) => table
                .column("STATION")?
                .iter()
                .filter_map(|s| s.parse::<f64>().ok())
                .collect(),
        };
        stations.iter().fold(None, |acc, s| match acc {
            None => Some((*s, *s)),
            Some((lo, hi)) => Some((lo.min(*s), hi.max(*s))),
        })
    }

    fn n_rows(&self) -> usize {
        match &self.readings {
            Readings::Numeric(table) => table.rows().len(),
            Readings::Text(table) => table.rows().len(),
        }
    }
}

impl std::fmt::Display for SurveyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "
Survey file
-----------
Filepath:\t\t{:?}
File type:\t\t{}
Units:\t\t\t{}
Channels:\t\t{}
Components:\t\t{}
Rows:\t\t\t{}
",
            self.source_path,
            self.format,
            self.header.units(),
            self.channels.len(),
            self.components.join(", "),
            self.n_rows(),
        )?;

        if let Some((lo, hi)) = self.station_range() {
            writeln!(f, "Stations:\t\t{} to {}", lo, hi)?;
        }

        match &self.header {
            Header::Instrument(header) => {
                writeln!(f, "Line:\t\t\t{}", header.line)?;
                writeln!(f, "Configuration:\t\t{}", header.config)?;
                writeln!(f, "Elevation:\t\t{}", header.elevation)?;
                writeln!(f, "Current:\t\t{}", header.current)?;
                match &header.receiver {
                    ReceiverArea::Dipole { hcp } => {
                        writeln!(f, "Rx area (HCP):\t\t{}", hcp.as_deref().unwrap_or("-"))?
                    }
                    ReceiverArea::PerAxis { .. } => {
                        for axis in RECEIVER_AXES {
                            if let Some(area) = header.receiver.axis(axis) {
                                writeln!(f, "Rx area {}:\t\t{}", axis, area)?;
                            }
                        }
                    }
                }
                match &header.transmitter {
                    Transmitter::Dipole { moment } => writeln!(f, "Tx moment:\t\t{}", moment)?,
                    Transmitter::Loop { turns } => writeln!(f, "Tx turns:\t\t{}", turns)?,
                }
                if let Some(sep) = &header.separation {
                    writeln!(f, "Separation (H/V):\t{} / {}", sep.horizontal, sep.vertical)?;
                }
                if let Some(timing) = &header.timing {
                    writeln!(f, "Base frequency:\t\t{}", timing.base_frequency)?;
                    writeln!(f, "Duty cycle:\t\t{}", timing.duty_cycle)?;
                }
            }
            Header::Plate { current, rx_area, .. } => {
                writeln!(f, "Current:\t\t{}", current)?;
                writeln!(f, "Rx area:\t\t{}", rx_area)?;
            }
            Header::Solution { data_type, .. } => writeln!(f, "Data type:\t\t{}", data_type)?,
            Header::Model {
                name,
                x_dim,
                y_dim,
                conductance,
            } => {
                writeln!(f, "Model:\t\t\t{}", name)?;
                writeln!(f, "Plate size:\t\t{} x {}", x_dim, y_dim)?;
                writeln!(f, "Conductance:\t\t{}", conductance)?;
            }
        }

        if let Channels::Frequencies { labels, .. } = &self.channels {
            writeln!(f, "Frequencies:\t\t{}", labels.join(", "))?;
        }

        if !self.loop_coordinates.is_empty() {
            writeln!(f, "Loop vertices:\t\t{}", self.loop_coordinates.len())?;
            for vertex in &self.loop_coordinates {
                writeln!(f, "\t\t\tE {:.1} N {:.1} Z {:.1}", vertex.easting, vertex.northing, vertex.elevation)?;
            }
        }
        Ok(())
    }
}
