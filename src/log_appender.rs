use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::Path;

/// Roll the active log file once it reaches this size
const LOG_ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Number of gzip'd archives kept by the roller
const LOG_ARCHIVE_COUNT: u32 = 3;

/// Install console and rolling-file logging under `log_dir/logs`.
///
/// Fails (instead of panicking) when a logger is already installed.
pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<()> {
    let logs_dir = log_dir.join("logs");
    fs::create_dir_all(&logs_dir)?;

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({l})} {d(%Y-%m-%d %H:%M:%S)} {M} - {m}{n}",
        )))
        .build();

    let archive_pattern = logs_dir.join("rmcloud.{}.log.gz");
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(&archive_pattern.to_string_lossy(), LOG_ARCHIVE_COUNT)?;

    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_ROLL_SIZE_BYTES)),
        Box::new(roller),
    );

    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {M}::{m}{n}")))
        .build(logs_dir.join("rmcloud.log"), Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )?;

    log4rs::init_config(config).context("A logger is already installed")?;
    Ok(())
}
