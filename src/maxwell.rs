/// Layout pieces shared by the Maxwell FEM and TEM exports
use crate::error::{Result, SurveyError};
use crate::header::{clean_units, HeaderMap};
use crate::record::{FileFormat, InstrumentHeader, ReceiverArea, Separation, Timing, Transmitter};

/// Marker that introduces the data block
pub const PROFILE_MARKER: &str = "/PROFILEX:";

/// Zero-based line indices of the two KEY:VALUE header lines
pub const HEADER_LINES: [usize; 2] = [1, 2];

/// The comma separated list that follows `marker` up to the end of its line.
///
/// `skip_chars` characters directly after the marker are dropped first (TEM lists are written as
/// e.g. "/TIMES(ms)=0.1,0.2", so four characters are skipped there).
pub fn marker_list(content: &str, marker: &str, skip_chars: usize) -> Result<Vec<String>> {
    let (_, after) = content
        .split_once(marker)
        .ok_or_else(|| SurveyError::Format(format!("no {marker} marker found")))?;

    let line = after.split('\n').next().unwrap_or("").trim_end_matches('\r');
    let list = line.chars().skip(skip_chars).collect::<String>();

    Ok(list
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Column names and raw rows of the block following the `/PROFILEX:` marker.
///
/// The column names are on the line directly above the marker. The last line of the block is a
/// trailing artifact of the export and is dropped.
pub fn data_block(content: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let sections = content.split(PROFILE_MARKER).collect::<Vec<&str>>();
    if sections.len() != 2 {
        return Err(SurveyError::Format(format!(
            "expected exactly one {PROFILE_MARKER} marker but found {}",
            sections.len() - 1
        )));
    }

    let top_lines = sections[0].split('\n').collect::<Vec<&str>>();
    if top_lines.len() < 2 {
        return Err(SurveyError::Format(format!("no column names above the {PROFILE_MARKER} marker")));
    }
    let columns = top_lines[top_lines.len() - 2]
        .split_whitespace()
        .map(|s| s.to_string())
        .collect::<Vec<String>>();

    let mut data_lines = sections[1].split('\n').skip(1).collect::<Vec<&str>>();
    data_lines.pop();

    let rows = data_lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().map(|s| s.to_string()).collect())
        .collect();

    Ok((columns, rows))
}

/// Lift the decoded header fields into an [`InstrumentHeader`].
///
/// Which receiver area and transmitter fields are required depends on the dipole flags. FEM files
/// carry all three axis areas for loop receivers, TEM files only those of the measured axes.
pub fn instrument_header(header: HeaderMap, format: FileFormat, components: &[String]) -> Result<InstrumentHeader> {
    let rx_dipole = header.flag("RXDIPOLE")?;
    let tx_dipole = header.flag("TXDIPOLE")?;

    let receiver = match (rx_dipole, format) {
        (true, FileFormat::Fem) => ReceiverArea::Dipole {
            hcp: Some(header.require("RXAREAHCP")?),
        },
        (true, _) => ReceiverArea::Dipole {
            hcp: header.get("RXAREAHCP").map(|s| s.to_string()),
        },
        (false, FileFormat::Fem) => ReceiverArea::PerAxis {
            x: Some(header.require("RXAREAX")?),
            y: Some(header.require("RXAREAY")?),
            z: Some(header.require("RXAREAZ")?),
        },
        (false, _) => {
            let area = |axis: &str| -> Result<Option<String>> {
                match components.iter().any(|c| c == axis) {
                    true => header.require(&format!("RXAREA{axis}")).map(Some),
                    false => Ok(None),
                }
            };
            ReceiverArea::PerAxis {
                x: area("X")?,
                y: area("Y")?,
                z: area("Z")?,
            }
        }
    };

    let transmitter = match tx_dipole {
        true => Transmitter::Dipole {
            moment: header.require("TXMOMENT")?,
        },
        false => Transmitter::Loop {
            turns: header.require("TXTURNS")?,
        },
    };

    let separation = match (rx_dipole && tx_dipole, format) {
        (true, FileFormat::Fem) => Some(Separation {
            horizontal: header.require("SEP")?,
            vertical: header.require("VSEP")?,
        }),
        (true, _) => match (header.get("SEP"), header.get("VSEP")) {
            (Some(h), Some(v)) => Some(Separation {
                horizontal: h.to_string(),
                vertical: v.to_string(),
            }),
            _ => None,
        },
        (false, _) => None,
    };

    let timing = match format {
        FileFormat::Tem => Some(Timing {
            base_frequency: header.require("BFREQ")?,
            duty_cycle: header.require("DUTYCYCLE")?,
            on_time: header.require("ONTIME")?,
            off_time: header.require("OFFTIME")?,
            turn_on: header.require("TURNON")?,
            turn_off: header.require("TURNOFF")?,
            timing_mark: header.require("TIMINGMARK")?,
        }),
        _ => None,
    };

    Ok(InstrumentHeader {
        line: header.require("LINE")?,
        config: header.require("CONFIG")?,
        elevation: header.require("ELEV")?,
        units: clean_units(&header.require("UNITS")?),
        current: header.require("CURRENT")?,
        receiver,
        transmitter,
        separation,
        timing,
        fields: header.into_fields(),
    })
}

/// Distinct values in order of first appearance
pub fn unique_in_order<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<String> = Vec::new();
    for value in values {
        if !unique.iter().any(|u| u == value) {
            unique.push(value.to_string());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::decode_header;

    #[test]
    fn test_marker_list() {
        let content = "x\n/TIMES(ms)=0.1, 0.2,0.3\r\n/TIMESWIDTH(ms)=0.05,0.05,0.1\n";
        assert_eq!(marker_list(content, "/TIMES(", 4).unwrap(), vec!["0.1", "0.2", "0.3"]);
        assert_eq!(marker_list(content, "/TIMESWIDTH(", 4).unwrap(), vec!["0.05", "0.05", "0.1"]);
        assert!(marker_list("/FREQ=\n", "/FREQ=", 0).unwrap().is_empty());
        assert!(marker_list(content, "/FREQ=", 0).is_err());
    }

    #[test]
    fn test_data_block() {
        let content = "header\nSTATION COMPONENT CH1\n/PROFILEX:100\n0 Z 1.0\n\n25 Z 2.0\nlast\n";

        let (columns, rows) = data_block(content).unwrap();

        assert_eq!(columns, vec!["STATION", "COMPONENT", "CH1"]);
        // The final (empty) line is dropped, as is the blank line in between
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["last"]);

        assert!(data_block("no marker").is_err());
        assert!(data_block("a\n/PROFILEX:\n/PROFILEX:\n").is_err());
    }

    #[test]
    fn test_instrument_header_fem_dipoles() {
        let map = decode_header(&[
            "LINE:1 CONFIG:HLEM ELEV:0 UNITS:(%Ht) CURRENT:1 RXDIPOLE:YES TXDIPOLE:YES",
            "RXAREAHCP:1 TXMOMENT:1 SEP:100 VSEP:0",
        ])
        .unwrap();

        let header = instrument_header(map, FileFormat::Fem, &[]).unwrap();

        assert_eq!(header.units, "%Ht");
        assert!(header.rx_dipole() && header.tx_dipole());
        assert_eq!(header.receiver, ReceiverArea::Dipole { hcp: Some("1".to_string()) });
        assert_eq!(header.separation.unwrap().horizontal, "100");
        assert!(header.timing.is_none());
    }

    #[test]
    fn test_instrument_header_tem_axes() {
        let map = decode_header(&[
            "LINE:1 CONFIG:FIXED ELEV:0 UNITS:(nT/s) CURRENT:10 RXDIPOLE:NO TXDIPOLE:NO TXTURNS:1",
            "BFREQ:5 DUTYCYCLE:50 ONTIME:50 OFFTIME:50 TURNON:0 TURNOFF:1.5 TIMINGMARK:0 RXAREAZ:100",
        ])
        .unwrap();

        let header = instrument_header(map.clone(), FileFormat::Tem, &["Z".to_string()]).unwrap();
        assert_eq!(header.receiver.axis("Z"), Some("100"));
        assert_eq!(header.receiver.axis("X"), None);
        assert_eq!(header.timing.unwrap().turn_off, "1.5");

        match instrument_header(map, FileFormat::Tem, &["X".to_string(), "Z".to_string()]) {
            Err(SurveyError::MissingHeaderField(key)) => assert_eq!(key, "RXAREAX"),
            other => panic!("Expected a missing field error, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_in_order() {
        assert_eq!(unique_in_order(["Z", "X", "Z", "Y", "X"]), vec!["Z", "X", "Y"]);
    }
}
