/// Dispatch of survey files to their parser by extension and content
use std::path::Path;

use crate::error::{Result, SurveyError};
use crate::record::{FileFormat, SurveyRecord};
use crate::{decay, fem, io, irap, mun, platef, tem};

type ParseFn = fn(&Path, &str) -> Result<SurveyRecord>;

/// One dispatch rule. Rules are tried in order and the first match wins.
pub struct Route {
    pub format: FileFormat,
    /// Lowercase extension without the dot
    pub extension: &'static str,
    pub accepts: fn(&str) -> bool,
    pub parse: ParseFn,
}

fn any_content(_: &str) -> bool {
    true
}

fn is_mun_content(content: &str) -> bool {
    content
        .lines()
        .next()
        .map_or(false, |line| line.contains(mun::DATA_TYPE_MARKER))
}

pub static ROUTES: [Route; 6] = [
    Route {
        format: FileFormat::Fem,
        extension: "fem",
        accepts: any_content,
        parse: fem::parse_str,
    },
    Route {
        format: FileFormat::Tem,
        extension: "tem",
        accepts: any_content,
        parse: tem::parse_str,
    },
    Route {
        format: FileFormat::Decay,
        extension: "dat",
        accepts: decay::is_decay_content,
        parse: decay::parse_str,
    },
    Route {
        format: FileFormat::Mun,
        extension: "dat",
        accepts: is_mun_content,
        parse: mun::parse_str,
    },
    Route {
        format: FileFormat::Irap,
        extension: "dat",
        accepts: irap::is_irap_content,
        parse: irap::parse_str,
    },
    Route {
        format: FileFormat::PlateF,
        extension: "dat",
        accepts: any_content,
        parse: platef::parse_str,
    },
];

/// Find the first route matching the extension and content of a file
pub fn route_for(filepath: &Path, content: &str) -> Option<&'static Route> {
    let extension = filepath.extension()?.to_str()?.to_lowercase();

    ROUTES
        .iter()
        .find(|route| route.extension == extension && (route.accepts)(content))
}

/// Read a survey file once and parse it with the matching format parser
pub fn parse(filepath: &Path) -> Result<SurveyRecord> {
    let content = io::read_survey_text(filepath)?;

    let route = route_for(filepath, &content).ok_or_else(|| SurveyError::UnknownFormat(filepath.to_path_buf()))?;
    (route.parse)(filepath, &content)
}
