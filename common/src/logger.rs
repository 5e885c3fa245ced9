// Log setup shared by every binary: colored terminal output on stderr and an
// optional log file, both driven by the `log` facade through fern.

use std::{fmt, fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[clap(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(format!("Invalid log level '{}'", s)),
        })
    }
}

pub fn default_logs_datetime_format() -> String {
    "%Y-%m-%d %H:%M:%S%.3f".to_string()
}

pub struct LoggerConfig<'a> {
    pub level: LogLevel,
    pub dir_path: &'a str,
    pub filename_log: &'a str,
    pub disable_file_logging: bool,
    pub disable_file_log_date_based: bool,
    pub disable_colors: bool,
    // Per-module overrides, e.g. ("rocksdb", LogLevel::Warn)
    pub module_logs: Vec<(String, LogLevel)>,
    pub file_level: LogLevel,
    pub logs_datetime_format: String,
}

/// Install the global logger. Fails if one is already installed.
pub fn setup_logger(config: LoggerConfig) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);

    let disable_colors = config.disable_colors;
    let terminal_format = config.logs_datetime_format.clone();
    let terminal = fern::Dispatch::new()
        .level(config.level.into())
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(&terminal_format);
            if disable_colors {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stderr());

    let mut base = fern::Dispatch::new().chain(terminal);
    for (module, level) in &config.module_logs {
        base = base.level_for(module.clone(), (*level).into());
    }

    if !config.disable_file_logging {
        fs::create_dir_all(config.dir_path)
            .with_context(|| format!("Error while creating logs folder {}", config.dir_path))?;

        let file_format = config.logs_datetime_format.clone();
        let file = fern::Dispatch::new()
            .level(config.file_level.into())
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    chrono::Local::now().format(&file_format),
                    record.level(),
                    record.target(),
                    message
                ))
            });

        let file = if config.disable_file_log_date_based {
            let path = Path::new(config.dir_path).join(config.filename_log);
            file.chain(
                fern::log_file(&path)
                    .with_context(|| format!("Error while opening log file {}", path.display()))?,
            )
        } else {
            file.chain(fern::DateBased::new(
                config.dir_path,
                format!("%Y-%m-%d.{}", config.filename_log),
            ))
        };

        base = base.chain(file);
    }

    base.apply().context("Error while installing the logger")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
