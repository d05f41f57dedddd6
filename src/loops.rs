/// Extraction of transmitter loop vertices from `LV<n><axis>:<value>` tokens
use crate::error::{parse_f64, Result, SurveyError};
use crate::record::LoopVertex;

/// Return the value of a loop vertex token, or None if the token is not one.
///
/// The token must contain "LV", at least one digit, one word character and a colon, e.g.
/// "LV12E:4500.0". A single trailing digit may act as the word character ("LV12:" reads as vertex
/// 1, axis "2").
pub fn loop_token_value(token: &str) -> Option<&str> {
    let start = token.find("LV")?;
    let rest = &token[start + 2..];
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let after_digits = &rest[digits..];
    let mut chars = after_digits.chars();
    match (chars.next(), chars.next()) {
        (Some(axis), Some(':')) if axis.is_alphanumeric() || axis == '_' => {
            Some(&after_digits[axis.len_utf8() + 1..])
        }
        (Some(':'), _) if digits >= 2 => Some(&after_digits[1..]),
        _ => None,
    }
}

/// Collect the loop vertices of a file, one vertex per line carrying "LV" tokens
pub fn extract_loop_coordinates<'a, I>(lines: I) -> Result<Vec<LoopVertex>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut vertices = Vec::new();

    for line in lines.into_iter().filter(|l| l.contains("LV")) {
        let values = line
            .split_whitespace()
            .map(|token| {
                loop_token_value(token).ok_or_else(|| {
                    SurveyError::Format(format!("'{token}' is not a loop vertex token in line '{}'", line.trim()))
                })
            })
            .collect::<Result<Vec<&str>>>()?;

        if values.len() != 3 {
            return Err(SurveyError::Format(format!(
                "expected easting, northing and elevation in loop line '{}' but found {} values",
                line.trim(),
                values.len()
            )));
        }

        vertices.push(LoopVertex {
            easting: parse_f64(values[0], "loop easting")?,
            northing: parse_f64(values[1], "loop northing")?,
            elevation: parse_f64(values[2], "loop elevation")?,
        });
    }

    Ok(vertices)
}
