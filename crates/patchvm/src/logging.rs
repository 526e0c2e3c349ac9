use patchvm_platform::AppPaths;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Appends to the log file of one CLI run.
///
/// The file is opened on the first record, so a run that logs nothing leaves
/// no file behind, and reopened when it disappears between two records.
struct LogFileWriter {
    path: PathBuf,
    file: Option<File>,
}

impl LogFileWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
        }
    }

    fn open(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = match self.file.take() {
            Some(file) if self.path.exists() => file,
            _ => Self::open(&self.path)?,
        };
        self.file.insert(file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().map_or(Ok(()), File::flush)
    }
}

/// Cut an oversized log down to its newest `max_log_size / 2` bytes, starting
/// at a line boundary.
fn trim_log_file_if_oversized(log_path: &Path, max_log_size: u64) {
    let Ok(metadata) = std::fs::metadata(log_path) else {
        return;
    };
    if metadata.len() <= max_log_size {
        return;
    }
    let Ok(contents) = std::fs::read(log_path) else {
        return;
    };

    let retained = usize::try_from(max_log_size / 2).unwrap_or(usize::MAX);
    let cut = contents.len().saturating_sub(retained);
    let keep_from = contents[cut..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(contents.len(), |pos| cut + pos + 1);
    if let Err(error) = std::fs::write(log_path, &contents[keep_from..]) {
        eprintln!("could not trim {}: {error}", log_path.display());
    }
}

/// Log to `debug.log` in the data dir, and to the terminal in debug builds
/// or when `verbose` is set.
pub fn init_logging(paths: &AppPaths, verbose: bool, max_log_size: u64) {
    let _ = paths.ensure_dirs();
    let log_path = paths.log_file();

    trim_log_file_if_oversized(&log_path, max_log_size);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("patchvm")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(WriteLogger::new(
        LevelFilter::Debug,
        config.clone(),
        LogFileWriter::new(log_path.clone()),
    ));

    if cfg!(debug_assertions) || verbose {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    let _ = CombinedLogger::init(loggers);

    set_verbose(verbose);
    log::debug!("Logging initialized, log file: {}", log_path.display());
}

pub fn set_verbose(enabled: bool) {
    if enabled {
        log::set_max_level(LevelFilter::Debug);
    } else {
        log::set_max_level(LevelFilter::Info);
    }
}
