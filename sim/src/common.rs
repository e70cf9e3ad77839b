//! Common utility functions for the localizer command line.
//!
//! This module contains:
//! - Logger initialization
//! - Scenario and output path validation
//! - Pose argument parsing

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use localizer::Pose;
use localizer::sim::{CONTROL_FILE, MAP_FILE, OBSERVATIONS_FILE};

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        create_parent_dir(log_path)?;
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("failed to open log file {}", log_path.display()))?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Check that `input` is a directory holding the required scenario files.
///
/// `ground_truth.csv` is optional and not checked.
pub fn validate_scenario_dir(input: &Path) -> Result<()> {
    if !input.is_dir() {
        bail!("Scenario path '{}' is not a directory.", input.display());
    }
    for file in [MAP_FILE, CONTROL_FILE, OBSERVATIONS_FILE] {
        if !input.join(file).is_file() {
            bail!(
                "Scenario directory '{}' is missing '{}'.",
                input.display(),
                file
            );
        }
    }
    Ok(())
}

/// Create the parent directory of an output file if it does not exist yet.
pub fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Parse a pose given as `x,y,theta`, e.g. `--start -1.5,2.0,0.1`.
pub fn parse_pose(s: &str) -> std::result::Result<Pose, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number '{}': {}", v.trim(), e))
        })
        .collect::<std::result::Result<Vec<f64>, String>>()?;
    match values.as_slice() {
        [x, y, theta] => Ok(Pose::new(*x, *y, *theta)),
        _ => Err(format!(
            "expected three comma separated values x,y,theta, got {}",
            values.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_validate_scenario_dir_complete() {
        let dir = tempdir().unwrap();
        for file in [MAP_FILE, CONTROL_FILE, OBSERVATIONS_FILE] {
            File::create(dir.path().join(file)).unwrap();
        }
        assert!(validate_scenario_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_validate_scenario_dir_missing_file() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join(MAP_FILE)).unwrap();
        File::create(dir.path().join(CONTROL_FILE)).unwrap();
        let err = validate_scenario_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains(OBSERVATIONS_FILE));
    }

    #[test]
    fn test_validate_scenario_dir_nonexistent() {
        assert!(validate_scenario_dir(Path::new("/nonexistent/scenario")).is_err());
    }

    #[test]
    fn test_validate_scenario_dir_rejects_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("map.csv");
        File::create(&file_path).unwrap();
        assert!(validate_scenario_dir(&file_path).is_err());
    }

    #[test]
    fn test_create_parent_dir() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("nested").join("results.csv");
        create_parent_dir(&output).unwrap();
        assert!(dir.path().join("nested").is_dir());
        // a bare file name has no parent to create
        assert!(create_parent_dir(Path::new("results.csv")).is_ok());
    }

    #[test]
    fn test_parse_pose() {
        assert_eq!(parse_pose("1.0,-2.0,0.5"), Ok(Pose::new(1.0, -2.0, 0.5)));
        assert_eq!(parse_pose("-1.5, 2, -0.1"), Ok(Pose::new(-1.5, 2.0, -0.1)));
    }

    #[test]
    fn test_parse_pose_rejects_bad_input() {
        assert!(parse_pose("1.0,2.0").is_err());
        assert!(parse_pose("1.0,2.0,0.1,4.0").is_err());
        assert!(parse_pose("a,b,c").is_err());
        assert!(parse_pose("").is_err());
    }
}
