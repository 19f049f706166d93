use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{AutorecordError, Result};
use crate::host::{HostLayout, HostTasks, LogLevel, LogMessage};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const GREY: &str = "\x1b[90m";
const BLUE_DIM: &str = "\x1b[34;2m";
const RESET: &str = "\x1b[0m";

const PREFIX: &str = "[autorecord] ";

/// Host tasks backed by the local file system.
#[derive(Debug, Clone)]
pub struct FsHost {
    layout: HostLayout,
}

impl FsHost {
    pub fn new(layout: HostLayout) -> Self {
        Self { layout }
    }
}

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => GREEN,
        LogLevel::Warn => YELLOW,
        LogLevel::Error => RED,
        LogLevel::Data => GREY,
        LogLevel::Log => BLUE_DIM,
        LogLevel::Default => "",
    }
}

/// Prefix every line of `msg` and colour it by level.
pub(crate) fn format_log_line(message: &LogMessage) -> String {
    let prefix = format!("{BLUE_DIM}{PREFIX}{RESET}");
    let body = format!("{prefix}{}", message.msg).replace('\n', &format!("\n{prefix}"));
    let color = level_color(message.level);
    let mut line = if color.is_empty() {
        body
    } else {
        format!("{color}{body}{RESET}")
    };
    for param in &message.params {
        line.push(' ');
        line.push_str(&param.to_string());
    }
    line
}

#[async_trait]
impl HostTasks for FsHost {
    fn layout(&self) -> &HostLayout {
        &self.layout
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Value>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| AutorecordError::MalformedArtifact {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<bool> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(true)
    }

    async fn log(&self, message: LogMessage) -> Result<()> {
        println!("{}", format_log_line(&message));
        Ok(())
    }
}
