use std::path::Path;

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

pub const LOG_FILE_MAX_FILES: usize = 3;
pub const LOG_FILE_MAX_LINES: usize = 1000;

/// Logs go to stderr, stdout is where the filtered route may be written.
/// With `log_file`, everything is also kept in a small set of rotated files.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = log_file {
        loggers.push(WriteLogger::new(level, config, rotating_file(path)));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}

/// `path` is the live file, older content moves to `path.<timestamp>`.
pub fn rotating_file(path: &Path) -> FileRotate<AppendTimestamp> {
    FileRotate::new(
        path,
        AppendTimestamp::default(FileLimit::MaxFiles(LOG_FILE_MAX_FILES)),
        ContentLimit::Lines(LOG_FILE_MAX_LINES),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn log_file_is_rotated() {
        let dir = TempDir::new("gps_route_filter_logs").unwrap();
        let path = dir.path().join("filter.log");
        let mut log = rotating_file(&path);
        for i in 0..(LOG_FILE_MAX_LINES * 2 + 10) {
            writeln!(log, "line {i}").unwrap();
        }
        log.flush().unwrap();
        drop(log);

        let live = fs::read_to_string(&path).unwrap();
        assert!(live.lines().count() <= LOG_FILE_MAX_LINES);
        assert!(live.ends_with(&format!("line {}\n", LOG_FILE_MAX_LINES * 2 + 9)));

        let files = fs::read_dir(dir.path()).unwrap().count();
        assert!(files > 1 && files <= LOG_FILE_MAX_FILES + 1, "{files} files");
    }
}
