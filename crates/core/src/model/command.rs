//! External-process model adapters.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;
use tracing::{debug, info};

use super::error::ModelError;
use super::traits::{Aligner, Separator};
use crate::alignment::AlignmentRequest;
use crate::config::{AlignmentConfig, SeparationConfig};

/// Runs an audio-separator style CLI.
pub struct CommandSeparator {
    config: SeparationConfig,
}

impl CommandSeparator {
    pub fn new(config: SeparationConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            "--model_filename".to_string(),
            self.config.model.clone(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--output_format".to_string(),
            self.config.output_format.clone(),
            input.to_string_lossy().to_string(),
        ]
    }
}

impl Separator for CommandSeparator {
    fn name(&self) -> &str {
        "command"
    }

    fn separate(&self, input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
        std::fs::create_dir_all(output_dir)?;
        let before: HashSet<PathBuf> = list_files(output_dir)?.into_iter().collect();

        let args = self.build_args(input, output_dir);
        debug!("Separator args: {:?}", args);
        let start = Instant::now();
        let output = run(&self.config.command, &args, None)?;
        check_status(&output)?;

        let produced: Vec<PathBuf> = list_files(output_dir)?
            .into_iter()
            .filter(|path| !before.contains(path))
            .collect();
        if produced.is_empty() {
            return Err(ModelError::NoOutput);
        }

        info!(
            "Separated {:?} into {} file(s) in {} ms",
            input,
            produced.len(),
            start.elapsed().as_millis()
        );
        Ok(order_by_stem_labels(produced, &self.config.stem_order))
    }
}

/// Order `files` by the first label (case-insensitive) their file name
/// contains, in `labels` order. Unlabelled files go last, sorted by name.
pub fn order_by_stem_labels(mut files: Vec<PathBuf>, labels: &[String]) -> Vec<PathBuf> {
    let labels: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let rank = labels
            .iter()
            .position(|label| name.contains(label.as_str()))
            .unwrap_or(labels.len());
        (rank, name)
    });
    files
}

/// Runs a forced-alignment CLI that reads the request as JSON on stdin and
/// prints the alignment as a JSON object on stdout.
pub struct CommandAligner {
    config: AlignmentConfig,
}

impl CommandAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, audio: &Path) -> Vec<String> {
        let mut args = vec![
            "--language".to_string(),
            self.config.language.clone(),
            "--device".to_string(),
            self.config.device.clone(),
        ];
        if let Some(ref model) = self.config.model_name {
            args.extend(["--model".to_string(), model.clone()]);
        }
        args.push(audio.to_string_lossy().to_string());
        args
    }
}

impl Aligner for CommandAligner {
    fn name(&self) -> &str {
        "command"
    }

    fn align(&self, request: &AlignmentRequest) -> Result<serde_json::Value, ModelError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| ModelError::invalid_output(format!("encoding request: {}", e)))?;
        let args = self.build_args(&request.audio_path);
        debug!("Aligner args: {:?}", args);

        let start = Instant::now();
        let output = run(&self.config.command, &args, Some(payload))?;
        check_status(&output)?;

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ModelError::invalid_output(format!("aligner stdout is not JSON: {}", e)))?;
        if !value.is_object() {
            return Err(ModelError::invalid_output("aligner stdout is not a JSON object"));
        }

        info!(
            "Aligned {} segment(s) against {:?} in {} ms",
            request.segments.len(),
            request.audio_path,
            start.elapsed().as_millis()
        );
        Ok(value)
    }
}

/// Spawn `argv + args`, optionally feeding `stdin`, and collect its output.
fn run(argv: &[String], args: &[String], stdin: Option<Vec<u8>>) -> Result<Output, ModelError> {
    let (program, leading) = argv
        .split_first()
        .ok_or_else(|| ModelError::command_failed("empty command", None))?;

    let mut child = Command::new(program)
        .args(leading)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModelError::CommandNotFound {
                    program: program.clone(),
                }
            } else {
                ModelError::Io(e)
            }
        })?;

    // Feed stdin from its own thread so a chatty child cannot deadlock us.
    let writer = match (stdin, child.stdin.take()) {
        (Some(bytes), Some(mut pipe)) => Some(std::thread::spawn(move || pipe.write_all(&bytes))),
        _ => None,
    };

    let output = child.wait_with_output()?;
    if let Some(handle) = writer {
        match handle.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit without reading everything.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(ModelError::Io(e)),
            Err(_) => return Err(ModelError::Panicked("stdin writer".to_string())),
        }
    }
    Ok(output)
}

fn check_status(output: &Output) -> Result<(), ModelError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(ModelError::command_failed(
        format!("exited with {}", output.status),
        (!stderr.is_empty()).then_some(stderr),
    ))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}
