//! Timestamped assessment log with a deduplicated warning stack.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};

use crate::base::split_file_name;
use crate::PelicunError;

#[derive(Debug)]
pub struct Logger {
    pub verbose: bool,
    pub log_show_ms: bool,
    pub log_file: Option<PathBuf>,
    pub warning_file: Option<PathBuf>,
    pub print_log: bool,
    warning_stack: Vec<String>,
    emitted: BTreeSet<String>,
    time_format: &'static str,
    spaces: String,
    log_div: String,
}

impl Logger {
    /// Creates a logger. When a log file is given it is truncated, and a
    /// `<name>_warnings<ext>` file is created next to it.
    pub fn new(
        verbose: bool,
        log_show_ms: bool,
        log_file: Option<&Path>,
        print_log: bool,
    ) -> Result<Self, PelicunError> {
        let (log_file, warning_file) = match log_file {
            Some(path) => {
                let (name, extension) = split_file_name(path);
                let parent = path.parent().unwrap_or_else(|| Path::new(""));
                let warning_file = parent.join(format!("{name}_warnings{extension}"));
                fs::write(path, "")?;
                fs::write(&warning_file, "")?;
                (Some(path.to_path_buf()), Some(warning_file))
            }
            None => (None, None),
        };

        let (time_format, spaces, log_div) = if log_show_ms {
            ("%H:%M:%S:%6f", " ".repeat(16), "-".repeat(80 - 17))
        } else {
            ("%H:%M:%S", " ".repeat(9), "-".repeat(80 - 10))
        };

        Ok(Self {
            verbose,
            log_show_ms,
            log_file,
            warning_file,
            print_log,
            warning_stack: Vec::new(),
            emitted: BTreeSet::new(),
            time_format,
            spaces,
            log_div,
        })
    }

    /// Logger that only keeps warnings in memory; used by tests and helpers.
    pub fn silent() -> Self {
        Self {
            verbose: false,
            log_show_ms: false,
            log_file: None,
            warning_file: None,
            print_log: false,
            warning_stack: Vec::new(),
            emitted: BTreeSet::new(),
            time_format: "%H:%M:%S",
            spaces: " ".repeat(9),
            log_div: "-".repeat(70),
        }
    }

    pub fn msg(&mut self, msg: &str) {
        self.write_msg(msg, true, true);
    }

    /// Continuation message: indented, no timestamp.
    pub fn note(&mut self, msg: &str) {
        self.write_msg(msg, false, true);
    }

    pub fn write_msg(&mut self, msg: &str, prepend_timestamp: bool, prepend_blank_space: bool) {
        let mut lines = Vec::new();
        for (idx, line) in msg.split('\n').enumerate() {
            let formatted = if prepend_timestamp && idx == 0 {
                format!("{} {line}", Local::now().format(self.time_format))
            } else if prepend_timestamp || prepend_blank_space {
                format!("{}{line}", self.spaces)
            } else {
                line.to_string()
            };
            if self.print_log {
                log::info!("{formatted}");
            }
            lines.push(formatted);
        }

        if let Some(path) = &self.log_file {
            let mut text = String::new();
            for line in &lines {
                text.push('\n');
                text.push_str(line);
            }
            append(path, &text);
        }
    }

    pub fn div(&mut self, prepend_timestamp: bool) {
        let line = if prepend_timestamp {
            self.log_div.clone()
        } else {
            "-".repeat(80)
        };
        self.write_msg(&line, prepend_timestamp, true);
    }

    /// Queues a warning; identical warnings are kept once.
    pub fn add_warning(&mut self, msg: &str) {
        let mut formatted = String::from("\n");
        for line in msg.split('\n') {
            formatted.push_str(&self.spaces);
            formatted.push_str(line);
            formatted.push('\n');
        }
        if !self.warning_stack.contains(&formatted) {
            self.warning_stack.push(formatted);
        }
    }

    /// Issues every queued warning that has not been issued before.
    pub fn emit_warnings(&mut self) {
        for message in std::mem::take(&mut self.warning_stack) {
            if self.emitted.contains(&message) {
                continue;
            }
            log::warn!("{}", message.trim());
            if let Some(path) = &self.warning_file {
                append(path, &message.replace(&self.spaces, ""));
            }
            self.emitted.insert(message);
        }
    }

    pub fn warn(&mut self, msg: &str) {
        self.add_warning(msg);
        self.emit_warnings();
    }

    /// Warnings issued so far, without indentation.
    pub fn emitted_warnings(&self) -> Vec<String> {
        self.emitted
            .iter()
            .map(|message| message.replace(&self.spaces, "").trim().to_string())
            .collect()
    }

    pub fn print_system_info(&mut self) {
        self.write_msg("System Information:", false, false);
        let info = format!(
            "local time zone: {}\nstart time: {}\nos: {}\narch: {}\npelicun: {}\n",
            Local::now().format("%:z"),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            std::env::consts::OS,
            std::env::consts::ARCH,
            crate::VERSION,
        );
        self.write_msg(&info, false, true);
    }
}

fn append(path: &Path, text: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(text.as_bytes()));
    if let Err(err) = result {
        log::error!("cannot write to {}: {err}", path.display());
    }
}
