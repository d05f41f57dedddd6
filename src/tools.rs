/// Miscellaneous functions that are used in other parts of the program
use core::ops::{Add, Div, Mul, Sub};
use std::path::Path;

/// Interpolate linearly between two known points
///
/// https://en.wikipedia.org/wiki/Linear_interpolation#Linear_interpolation_between_two_known_points
///
/// # Arguments
/// - `known_xy0`: The first known point as (explanatory, independent)
/// - `known_xy1`: The second known point as (explanatory, independent)
/// - `x`: The explanatory point at which to interpolate the independent variables
///
/// # Returns
/// The interpolated independent (y) value.
pub fn interpolate_between_known<T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T> + Copy>(
    known_xy0: (T, T),
    known_xy1: (T, T),
    x: T,
) -> T {
    (known_xy0.1 * (known_xy1.0 - x) + known_xy1.1 * (x - known_xy0.0)) / (known_xy1.0 - known_xy0.0)
}

/// Parse a list of channel times
///
/// The string is either a comma separated list ("1e-4,2e-4") or the path to a file with one time
/// per line. Blank lines and text after '#' in a file are ignored.
///
/// # Returns
/// The channel times in the order given, or a message describing the first bad entry.
pub fn parse_channel_list(string: &str) -> Result<Vec<f64>, String> {
    let path = Path::new(string);

    let entries: Vec<String> = match path.is_file() {
        true => std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read channel file {:?}: {}", path, e))?
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        false => string.split(',').map(|s| s.trim().to_string()).collect(),
    };

    let times = entries
        .iter()
        .map(|entry| {
            entry
                .parse::<f64>()
                .map_err(|_| format!("Could not parse channel time: '{}'", entry))
        })
        .collect::<Result<Vec<f64>, String>>()?;

    match times.is_empty() {
        true => Err(format!("No channel times found in: {}", string)),
        false => Ok(times),
    }
}

#[cfg(test)]
mod tests {

    #[test]
    fn test_interpolate_between_known() {
        let known_xy0 = (0_f64, 0_f64);
        let known_xy1 = (5_f64, 10_f64);

        assert_eq!(super::interpolate_between_known(known_xy0, known_xy1, 2.5), 5.0)
    }

    #[test]
    fn test_parse_channel_list() {
        assert_eq!(super::parse_channel_list("1e-4, 2e-4,3e-4"), Ok(vec![1e-4, 2e-4, 3e-4]));
        assert_eq!(super::parse_channel_list("0.5"), Ok(vec![0.5]));

        assert!(super::parse_channel_list("1e-4,,2e-4").unwrap_err().contains("Could not parse"));
        assert!(super::parse_channel_list("a").unwrap_err().contains("'a'"));

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("channels.txt");
        std::fs::write(&path, "# channel times (s)\n1e-4\n\n2e-4 # second\n").unwrap();

        assert_eq!(super::parse_channel_list(path.to_str().unwrap()), Ok(vec![1e-4, 2e-4]));

        let empty = temp_dir.path().join("empty.txt");
        std::fs::write(&empty, "# nothing\n").unwrap();
        assert!(super::parse_channel_list(empty.to_str().unwrap()).unwrap_err().contains("No channel times"));
    }
}
