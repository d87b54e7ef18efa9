use std::path::Path;

use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::StartupError;

const PATTERN: &str = "{d(%H:%M:%S)(utc)} {l} - {m}\n";

/// Console plus one file per UTC day under `log_dir`.
pub fn init_file_logger(log_dir: &Path, level: LevelFilter) -> Result<(), StartupError> {
    let current_date = chrono::offset::Utc::now().date_naive().to_string();
    let path = log_dir.join(format!("{}.log", current_date));

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(&path)
        .map_err(|error| StartupError::Logger(format!("{}: {}", path.display(), error)))?;
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )
        .map_err(|error| StartupError::Logger(error.to_string()))?;

    log4rs::init_config(config).map_err(|error| StartupError::Logger(error.to_string()))?;
    info!("Logger initialized, writing to {}", path.display());

    Ok(())
}
