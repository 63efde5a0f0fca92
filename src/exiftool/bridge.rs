use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::debug_log::{preview, DebugLog};
use crate::error::{ErrorKind, NodeError, NodeFailure, NodeResult};
use crate::exiftool::report::{format_tags, group_counts, value_text, OutputFormat, TagMap};
use crate::exiftool::runner::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::image_buffer::{ImageBuffer, BRIDGE_PLACEHOLDER_SIZE};
use crate::nodes::folder_selector::decode_image;
use crate::nodes::png_text::save_png_with_text;
use crate::settings::ExifToolSettings;

pub const FAILURE_CONTEXT: &str = "ExifTool operation failed";
const SOURCE_FILE_KEY: &str = "SourceFile";
const LOG_LIST_LIMIT: usize = 10;
const LOG_VALUE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    ReadAll,
    ReadTags,
    Write,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadAll => "Read All Metadata",
            Self::ReadTags => "Read Specific Tags",
            Self::Write => "Write Metadata",
        }
    }
}

impl FromStr for Operation {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(&['-', '_'][..], " ");
        match normalized.as_str() {
            "read all metadata" | "read all" | "read" => Ok(Self::ReadAll),
            "read specific tags" | "read tags" | "tags" => Ok(Self::ReadTags),
            "write metadata" | "write" => Ok(Self::Write),
            _ => Err(NodeError::invalid_input(format!(
                "unknown operation '{value}' (expected Read All Metadata|Read Specific Tags|Write Metadata)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExifToolRequest {
    pub operation: Operation,
    pub image: Option<ImageBuffer>,
    /// Operated on directly when set; otherwise `image` goes through a temp PNG.
    pub file_path: Option<PathBuf>,
    pub output_format: OutputFormat,
    /// Group name such as `EXIF` or `XMP`; a full `Group:all` selector is kept as is.
    pub group_filter: Option<String>,
    pub tag_names: Vec<String>,
    /// JSON object of tag/value pairs for `Operation::Write`.
    pub metadata_to_write: Option<String>,
    pub preserve_existing: bool,
    pub include_binary: bool,
    pub extract_embedded: bool,
}

impl Default for ExifToolRequest {
    fn default() -> Self {
        Self {
            operation: Operation::default(),
            image: None,
            file_path: None,
            output_format: OutputFormat::default(),
            group_filter: None,
            tag_names: Vec::new(),
            metadata_to_write: None,
            preserve_existing: true,
            include_binary: false,
            extract_embedded: false,
        }
    }
}

impl ExifToolRequest {
    fn file_path(&self) -> Option<&Path> {
        self.file_path
            .as_deref()
            .filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
    }

    fn group_filter(&self) -> Option<&str> {
        self.group_filter
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }
}

/// One tag name per line; blank lines are dropped.
pub fn parse_tag_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExifToolOutput {
    pub image: ImageBuffer,
    /// Tag map rendered in the requested output format.
    pub metadata: String,
    pub debug_log: String,
}

/// The file the tool operates on. A temporary PNG is removed when dropped.
enum Target {
    Provided(PathBuf),
    Temporary(NamedTempFile),
}

impl Target {
    fn path(&self) -> &Path {
        match self {
            Self::Provided(path) => path.as_path(),
            Self::Temporary(file) => file.path(),
        }
    }
}

pub struct ExifToolBridge<R> {
    settings: ExifToolSettings,
    runner: R,
}

impl<R> ExifToolBridge<R>
where
    R: CommandRunner,
{
    pub fn new(settings: ExifToolSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    pub fn process(&self, request: &ExifToolRequest) -> Result<ExifToolOutput, NodeFailure> {
        if !self.settings.binary.is_file() {
            let message = format!("ExifTool not found at: {}", self.settings.binary.display());
            warn!(binary = %self.settings.binary.display(), "exiftool binary missing");
            return Ok(self.error_payload(request, ErrorKind::ToolMissing, message));
        }

        let target = match self.resolve_target(request) {
            Ok(Some(target)) => target,
            Ok(None) => {
                let message = "No image or file path provided";
                return Ok(self.error_payload(request, ErrorKind::InvalidInput, message));
            }
            Err(err) => return Err(self.failure(DebugLog::new(), err)),
        };

        let mut log = self.start_log(request, &target);
        let result = self.run_operation(request, &target, &mut log);
        // `target` drops at the end of this scope, removing any temp file on both paths.
        match result {
            Ok((image, tags)) => {
                info!(
                    operation = request.operation.as_str(),
                    path = %target.path().display(),
                    fields = tags.len(),
                    "exiftool operation completed"
                );
                let metadata = format_tags(&tags, request.output_format)
                    .map_err(|err| self.failure(log.clone(), err))?;
                success_log(&mut log, request.operation, &tags);
                Ok(ExifToolOutput {
                    image,
                    metadata,
                    debug_log: log.into_string(),
                })
            }
            Err(err) => Err(self.failure(log, err)),
        }
    }

    pub fn build_read_all_command(
        &self,
        path: &Path,
        group_filter: Option<&str>,
        include_binary: bool,
    ) -> CommandSpec {
        let mut args = vec![
            String::from("-json"),
            String::from("-a"),
            String::from("-G1"),
        ];
        if let Some(group) = group_filter {
            args.push(group_selector(group));
        }
        if include_binary {
            args.push(String::from("-b"));
        }
        args.push(path.to_string_lossy().to_string());
        self.command(args)
    }

    pub fn build_read_tags_command(&self, path: &Path, tags: &[String]) -> CommandSpec {
        let mut args = vec![String::from("-json"), String::from("-G1")];
        args.extend(tags.iter().map(|tag| format!("-{}", tag.trim_start_matches('-'))));
        args.push(path.to_string_lossy().to_string());
        self.command(args)
    }

    /// `[-all=] -json=- -overwrite_original FILE`, tags piped as a one-element array.
    pub fn build_write_command(
        &self,
        path: &Path,
        tags: &TagMap,
        preserve_existing: bool,
    ) -> NodeResult<CommandSpec> {
        let mut args = Vec::new();
        if !preserve_existing {
            args.push(String::from("-all="));
        }
        args.push(String::from("-json=-"));
        args.push(String::from("-overwrite_original"));
        args.push(path.to_string_lossy().to_string());
        let payload = serde_json::to_string(&[tags])
            .map_err(|e| NodeError::json(format!("failed to encode tags for writing: {e}")))?;
        Ok(self.command(args).with_stdin(payload))
    }

    pub fn build_thumbnail_command(&self, path: &Path) -> CommandSpec {
        self.command(vec![
            String::from("-b"),
            String::from("-ThumbnailImage"),
            path.to_string_lossy().to_string(),
        ])
    }

    pub fn read_all(
        &self,
        path: &Path,
        group_filter: Option<&str>,
        include_binary: bool,
        extract_embedded: bool,
        log: &mut DebugLog,
    ) -> NodeResult<TagMap> {
        let spec = self.build_read_all_command(path, group_filter, include_binary);
        log.line(format!("Executing: {}...", spec.display_prefix(3)));
        let tags = self.run_json(&spec)?;

        if extract_embedded {
            self.probe_thumbnail(path, log)?;
        }
        Ok(tags)
    }

    pub fn read_tags(&self, path: &Path, tags: &[String], log: &mut DebugLog) -> NodeResult<TagMap> {
        if tags.is_empty() {
            log.line("[WARNING] No tags specified");
            return Ok(warning("No tags specified"));
        }

        log.line(format!("Reading {} specific tags:", tags.len()));
        for tag in tags.iter().take(LOG_LIST_LIMIT) {
            log.line(format!("  - {tag}"));
        }
        if tags.len() > LOG_LIST_LIMIT {
            log.line(format!("  ... and {} more", tags.len() - LOG_LIST_LIMIT));
        }

        let spec = self.build_read_tags_command(path, tags);
        let found = self.run_json(&spec)?;
        log.line(format!("Found {}/{} requested tags", found.len(), tags.len()));
        Ok(found)
    }

    /// Writes the JSON object in `raw`, then re-reads everything for a verified view.
    pub fn write(
        &self,
        path: &Path,
        raw: Option<&str>,
        preserve_existing: bool,
        log: &mut DebugLog,
    ) -> NodeResult<TagMap> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            log.line("[WARNING] No metadata to write");
            return Ok(warning("No metadata to write"));
        }

        let tags = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(NodeError::invalid_input(
                    "metadata to write must be a JSON object of tag/value pairs",
                ))
            }
            Err(e) => {
                return Err(NodeError::json(format!("invalid JSON in metadata to write: {e}")))
            }
        };
        if tags.is_empty() {
            log.line("[WARNING] No metadata to write");
            return Ok(warning("No metadata to write"));
        }

        log.line(format!("Writing {} metadata fields:", tags.len()));
        for (tag, value) in tags.iter().take(LOG_LIST_LIMIT) {
            log.line(format!(
                "  {tag} = {}",
                preview(&value_text(value), LOG_VALUE_CHARS)
            ));
        }
        if tags.len() > LOG_LIST_LIMIT {
            log.line(format!("  ... and {} more", tags.len() - LOG_LIST_LIMIT));
        }
        log.field("Preserve existing", preserve_existing);

        let spec = self.build_write_command(path, &tags, preserve_existing)?;
        log.line(format!("Executing: {}...", spec.display_prefix(2)));
        let output = self.run_checked(&spec)?;
        let summary = output.stdout_text();
        if !summary.trim().is_empty() {
            log.line(format!("ExifTool: {}", summary.trim()));
        }

        log.line("Verifying written metadata...");
        let verify = self.build_read_all_command(path, None, false);
        self.run_json(&verify)
    }

    fn probe_thumbnail(&self, path: &Path, log: &mut DebugLog) -> NodeResult<()> {
        log.line("Checking for embedded thumbnail...");
        let output = self.run(&self.build_thumbnail_command(path))?;
        if output.status_code == 0 && !output.stdout.is_empty() {
            log.line(format!(
                "Extracted embedded thumbnail ({} bytes)",
                output.stdout.len()
            ));
        } else {
            log.line("No embedded files found");
        }
        Ok(())
    }

    fn run_operation(
        &self,
        request: &ExifToolRequest,
        target: &Target,
        log: &mut DebugLog,
    ) -> NodeResult<(ImageBuffer, TagMap)> {
        let path = target.path();
        match request.operation {
            Operation::ReadAll => {
                let tags = self.read_all(
                    path,
                    request.group_filter(),
                    request.include_binary,
                    request.extract_embedded,
                    log,
                )?;
                Ok((self.passthrough_image(request, path)?, tags))
            }
            Operation::ReadTags => {
                let tags = self.read_tags(path, &request.tag_names, log)?;
                Ok((self.passthrough_image(request, path)?, tags))
            }
            Operation::Write => {
                let tags = self.write(
                    path,
                    request.metadata_to_write.as_deref(),
                    request.preserve_existing,
                    log,
                )?;
                let decoded = decode_image(path)?;
                Ok((ImageBuffer::from_dynamic(&decoded.image), tags))
            }
        }
    }

    fn passthrough_image(&self, request: &ExifToolRequest, path: &Path) -> NodeResult<ImageBuffer> {
        match request.image.as_ref() {
            Some(image) => Ok(image.clone()),
            None => Ok(ImageBuffer::from_dynamic(&decode_image(path)?.image)),
        }
    }

    fn resolve_target(&self, request: &ExifToolRequest) -> NodeResult<Option<Target>> {
        if let Some(path) = request.file_path() {
            return Ok(Some(Target::Provided(path.to_path_buf())));
        }
        let Some(image) = request.image.as_ref() else {
            return Ok(None);
        };
        let file = tempfile::Builder::new()
            .prefix("metadata_nodes_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| NodeError::io("failed to create temporary file", &e))?;
        save_png_with_text(&image.to_dynamic(), &[], file.path())?;
        Ok(Some(Target::Temporary(file)))
    }

    fn command(&self, args: Vec<String>) -> CommandSpec {
        CommandSpec::new(
            self.settings.binary.to_string_lossy().to_string(),
            args,
            self.settings.timeout,
        )
    }

    fn run(&self, spec: &CommandSpec) -> NodeResult<CommandOutput> {
        self.runner.run(spec).map_err(|err| match err {
            CommandError::Timeout { .. } => NodeError::new(ErrorKind::ToolTimeout, err.to_string()),
            CommandError::Spawn { .. } | CommandError::Wait { .. } => {
                NodeError::new(ErrorKind::ToolFailed, err.to_string())
            }
        })
    }

    fn run_checked(&self, spec: &CommandSpec) -> NodeResult<CommandOutput> {
        let output = self.run(spec)?;
        if output.status_code != 0 {
            return Err(NodeError::new(
                ErrorKind::ToolFailed,
                format!("ExifTool failed: {}", output.stderr.trim()),
            ));
        }
        Ok(output)
    }

    fn run_json(&self, spec: &CommandSpec) -> NodeResult<TagMap> {
        let output = self.run_checked(spec)?;
        parse_tool_json(&output.stdout)
    }

    fn start_log(&self, request: &ExifToolRequest, target: &Target) -> DebugLog {
        let mut log = DebugLog::new();
        log.banner()
            .line("EXIFTOOL Metadata Processing")
            .rule()
            .line(format!("Tool: ExifTool ({})", self.settings.binary.display()))
            .line(format!("Operation: {}", request.operation.as_str()))
            .line(format!("Output Format: {}", request.output_format.as_str()));
        if let Some(group) = request.group_filter() {
            log.line(format!("Group Filter: {group}"));
        }
        match target {
            Target::Provided(path) => log.line(format!("Source: {}", path.display())),
            Target::Temporary(_) => log.line("Source: Image buffer (temporary PNG)"),
        };
        log.line("Status: Processing...").banner().blank();
        log
    }

    fn error_payload(
        &self,
        request: &ExifToolRequest,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> ExifToolOutput {
        let message = message.into();
        error!(kind = kind.as_str(), error = %message, "exiftool request rejected");
        let mut log = DebugLog::new();
        log.banner()
            .line("EXIFTOOL Metadata Processing")
            .rule()
            .line(format!("[ERROR] {message}"))
            .banner();
        ExifToolOutput {
            image: request.image.clone().unwrap_or_else(|| {
                ImageBuffer::blank(BRIDGE_PLACEHOLDER_SIZE, BRIDGE_PLACEHOLDER_SIZE)
            }),
            metadata: json!({ "error": message }).to_string(),
            debug_log: log.into_string(),
        }
    }

    fn failure(&self, mut log: DebugLog, err: NodeError) -> NodeFailure {
        error!(kind = err.kind.as_str(), error = %err, "exiftool operation failed");
        log.error(format!("{FAILURE_CONTEXT}: {err}"));
        NodeFailure {
            context: FAILURE_CONTEXT,
            error: err,
            debug_log: log.into_string(),
        }
    }
}

/// `EXIF` becomes `-EXIF:all`; an explicit `XMP-dc:all` is passed through.
pub fn group_selector(group: &str) -> String {
    let group = group.trim().trim_start_matches('-');
    if group.contains(':') {
        format!("-{group}")
    } else {
        format!("-{group}:all")
    }
}

/// First object of the tool's JSON array, minus the `SourceFile` bookkeeping key.
pub fn parse_tool_json(stdout: &[u8]) -> NodeResult<TagMap> {
    let parsed = serde_json::from_slice::<Value>(stdout)
        .map_err(|e| NodeError::json(format!("failed to parse ExifTool output: {e}")))?;
    let mut tags = match parsed {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(NodeError::json("ExifTool output array holds a non-object"))
            }
            None => TagMap::new(),
        },
        _ => return Err(NodeError::json("ExifTool output is not a JSON array")),
    };
    tags.remove(SOURCE_FILE_KEY);
    Ok(tags)
}

fn warning(message: &str) -> TagMap {
    let mut map = TagMap::new();
    map.insert(String::from("warning"), Value::String(message.to_string()));
    map
}

fn success_log(log: &mut DebugLog, operation: Operation, tags: &TagMap) {
    log.blank().line("[OK] Operation completed successfully");
    match operation {
        Operation::Write => {
            log.line("Metadata written and verified successfully");
        }
        Operation::ReadAll | Operation::ReadTags => {
            log.line(format!("Total fields extracted: {}", tags.len()));
            let counts = group_counts(tags);
            if !counts.is_empty() {
                log.blank().line("Breakdown by group:");
                for (group, count) in counts {
                    log.line(format!("  {group}: {count} fields"));
                }
            }
        }
    }
    log.banner();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct FakeRunner {
        seen: Arc<Mutex<Vec<CommandSpec>>>,
        next: Arc<Mutex<VecDeque<Result<CommandOutput, CommandError>>>>,
    }

    impl FakeRunner {
        fn with_outputs(outputs: Vec<Result<CommandOutput, CommandError>>) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                next: Arc::new(Mutex::new(outputs.into_iter().collect())),
            }
        }

        fn take_seen(&self) -> Vec<CommandSpec> {
            std::mem::take(&mut *self.seen.lock().expect("fake runner mutex poisoned"))
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
            self.seen
                .lock()
                .expect("fake runner mutex poisoned")
                .push(spec.clone());
            self.next
                .lock()
                .expect("fake runner mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(ok_stdout("[{}]")))
        }
    }

    fn ok_stdout(stdout: &str) -> CommandOutput {
        CommandOutput {
            status_code: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: String::new(),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        binary: PathBuf,
        image_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir should exist");
        let binary = dir.path().join("exiftool");
        std::fs::write(&binary, b"#!/bin/sh\n").expect("fake binary should write");
        let image_path = dir.path().join("photo.png");
        image::RgbImage::from_pixel(4, 3, image::Rgb([200, 100, 50]))
            .save(&image_path)
            .expect("fixture png should save");
        Fixture {
            _dir: dir,
            binary,
            image_path,
        }
    }

    fn bridge(binary: &Path, runner: FakeRunner) -> ExifToolBridge<FakeRunner> {
        ExifToolBridge::new(
            ExifToolSettings {
                binary: binary.to_path_buf(),
                timeout: Duration::from_secs(30),
            },
            runner,
        )
    }

    #[test]
    fn missing_binary_returns_error_payload_without_running() {
        let runner = FakeRunner::default();
        let bridge = bridge(Path::new("/definitely/missing/exiftool"), runner.clone());
        let output = bridge
            .process(&ExifToolRequest {
                file_path: Some(PathBuf::from("/tmp/whatever.png")),
                ..ExifToolRequest::default()
            })
            .expect("missing binary is not a failure");

        assert!(runner.take_seen().is_empty());
        assert_eq!(
            output.metadata,
            r#"{"error":"ExifTool not found at: /definitely/missing/exiftool"}"#
        );
        assert_eq!(output.image.shape(), (64, 64, 3));
        assert!(output.image.is_blank());
        assert!(output.debug_log.contains("[ERROR] ExifTool not found"));
    }

    #[test]
    fn missing_input_returns_error_payload() {
        let fx = fixture();
        let runner = FakeRunner::default();
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest::default())
            .expect("missing input is not a failure");
        assert!(runner.take_seen().is_empty());
        assert_eq!(output.metadata, r#"{"error":"No image or file path provided"}"#);
        assert_eq!(output.image.shape(), (64, 64, 3));
    }

    #[test]
    fn read_all_builds_expected_arguments() {
        let fx = fixture();
        let bridge = bridge(&fx.binary, FakeRunner::default());
        let spec = bridge.build_read_all_command(&fx.image_path, Some("EXIF"), true);
        let path = fx.image_path.to_string_lossy().to_string();
        assert_eq!(spec.program, fx.binary.to_string_lossy());
        assert_eq!(spec.args, vec!["-json", "-a", "-G1", "-EXIF:all", "-b", path.as_str()]);
        assert_eq!(spec.timeout, Duration::from_secs(30));
    }

    #[test]
    fn read_all_strips_source_file_and_formats() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![Ok(ok_stdout(
            r#"[{"SourceFile":"photo.png","PNG:ImageWidth":4,"XMP-dc:Title":"T"}]"#,
        ))]);
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                file_path: Some(fx.image_path.clone()),
                output_format: OutputFormat::CompactJson,
                ..ExifToolRequest::default()
            })
            .expect("read should succeed");

        assert_eq!(output.metadata, r#"{"PNG:ImageWidth":4,"XMP-dc:Title":"T"}"#);
        assert_eq!(output.image.shape(), (3, 4, 3));
        assert!(output.debug_log.contains("Total fields extracted: 2"));
        assert!(output.debug_log.contains("  PNG: 1 fields"));
        assert!(output.debug_log.contains("  XMP-dc: 1 fields"));
        let seen = runner.take_seen();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].args.iter().any(|a| a == "-b"));
    }

    #[test]
    fn image_buffer_goes_through_temp_png_that_is_removed() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![Ok(ok_stdout(r#"[{"SourceFile":"x"}]"#))]);
        let image = ImageBuffer::blank(8, 8);
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                image: Some(image.clone()),
                ..ExifToolRequest::default()
            })
            .expect("read should succeed");

        assert_eq!(output.image, image);
        let seen = runner.take_seen();
        let temp = PathBuf::from(seen[0].args.last().expect("path argument"));
        assert_eq!(temp.extension().and_then(|e| e.to_str()), Some("png"));
        assert!(!temp.exists(), "temp file should be deleted after the call");
    }

    #[test]
    fn temp_png_is_removed_on_failure_too() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![Ok(CommandOutput {
            status_code: 1,
            stdout: Vec::new(),
            stderr: String::from("Error: bad file"),
        })]);
        let failure = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                image: Some(ImageBuffer::blank(2, 2)),
                ..ExifToolRequest::default()
            })
            .expect_err("non-zero exit should fail");

        assert_eq!(failure.kind(), ErrorKind::ToolFailed);
        assert_eq!(
            failure.to_string(),
            "ExifTool operation failed: ExifTool failed: Error: bad file"
        );
        assert!(failure.debug_log.contains("Executing:"));
        let seen = runner.take_seen();
        let temp = PathBuf::from(seen[0].args.last().expect("path argument"));
        assert!(!temp.exists());
    }

    #[test]
    fn timeout_is_reported_as_tool_timeout() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![Err(CommandError::Timeout {
            program: String::from("exiftool"),
            timeout: Duration::from_secs(30),
        })]);
        let failure = bridge(&fx.binary, runner)
            .process(&ExifToolRequest {
                file_path: Some(fx.image_path.clone()),
                ..ExifToolRequest::default()
            })
            .expect_err("timeout should fail");
        assert_eq!(failure.kind(), ErrorKind::ToolTimeout);
    }

    #[test]
    fn read_tags_with_empty_list_skips_the_tool() {
        let fx = fixture();
        let runner = FakeRunner::default();
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                operation: Operation::ReadTags,
                file_path: Some(fx.image_path.clone()),
                output_format: OutputFormat::CompactJson,
                ..ExifToolRequest::default()
            })
            .expect("empty tag list should not fail");
        assert_eq!(output.metadata, r#"{"warning":"No tags specified"}"#);
        assert!(runner.take_seen().is_empty());
    }

    #[test]
    fn read_tags_prefixes_each_tag_and_logs_counts() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![Ok(ok_stdout(
            r#"[{"SourceFile":"p","IFD0:Make":"Canon"}]"#,
        ))]);
        let tags = (1..=12).map(|n| format!("Tag{n}")).collect::<Vec<_>>();
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                operation: Operation::ReadTags,
                file_path: Some(fx.image_path.clone()),
                tag_names: tags,
                ..ExifToolRequest::default()
            })
            .expect("read tags should succeed");

        let seen = runner.take_seen();
        assert_eq!(seen[0].args[..3].to_vec(), vec!["-json", "-G1", "-Tag1"]);
        assert!(output.debug_log.contains("  ... and 2 more"));
        assert!(output.debug_log.contains("Found 1/12 requested tags"));
    }

    #[test]
    fn write_pipes_tags_and_verifies() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![
            Ok(ok_stdout("    1 image files updated\n")),
            Ok(ok_stdout(r#"[{"SourceFile":"p","XMP-dc:Title":"Hello"}]"#)),
        ]);
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                operation: Operation::Write,
                file_path: Some(fx.image_path.clone()),
                metadata_to_write: Some(String::from(r#"{"XMP-dc:Title":"Hello"}"#)),
                preserve_existing: false,
                output_format: OutputFormat::CompactJson,
                ..ExifToolRequest::default()
            })
            .expect("write should succeed");

        let seen = runner.take_seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].args[..3].to_vec(), vec!["-all=", "-json=-", "-overwrite_original"]);
        assert_eq!(seen[0].stdin.as_deref(), Some(r#"[{"XMP-dc:Title":"Hello"}]"#));
        assert_eq!(seen[1].args[..3].to_vec(), vec!["-json", "-a", "-G1"]);
        assert_eq!(output.metadata, r#"{"XMP-dc:Title":"Hello"}"#);
        assert_eq!(output.image.shape(), (3, 4, 3));
        assert!(output.debug_log.contains("ExifTool: 1 image files updated"));
        assert!(output.debug_log.contains("Metadata written and verified successfully"));
    }

    #[test]
    fn write_preserving_existing_omits_clear_flag() {
        let fx = fixture();
        let bridge = bridge(&fx.binary, FakeRunner::default());
        let mut tags = TagMap::new();
        tags.insert(String::from("Rating"), json!(3));
        let spec = bridge
            .build_write_command(&fx.image_path, &tags, true)
            .expect("write command should build");
        assert!(!spec.args.iter().any(|a| a == "-all="));
        assert_eq!(spec.args[0], "-json=-");
    }

    #[test]
    fn write_rejects_invalid_payloads() {
        let fx = fixture();
        for (payload, kind) in [
            ("{not json", ErrorKind::Json),
            ("[1, 2]", ErrorKind::InvalidInput),
        ] {
            let runner = FakeRunner::default();
            let failure = bridge(&fx.binary, runner.clone())
                .process(&ExifToolRequest {
                    operation: Operation::Write,
                    file_path: Some(fx.image_path.clone()),
                    metadata_to_write: Some(String::from(payload)),
                    ..ExifToolRequest::default()
                })
                .expect_err("bad payload should fail");
            assert_eq!(failure.kind(), kind);
            assert!(runner.take_seen().is_empty());
        }
    }

    #[test]
    fn write_with_empty_payload_warns() {
        let fx = fixture();
        let runner = FakeRunner::default();
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                operation: Operation::Write,
                file_path: Some(fx.image_path.clone()),
                metadata_to_write: Some(String::from("  ")),
                output_format: OutputFormat::CompactJson,
                ..ExifToolRequest::default()
            })
            .expect("empty payload should not fail");
        assert_eq!(output.metadata, r#"{"warning":"No metadata to write"}"#);
        assert!(runner.take_seen().is_empty());
    }

    #[test]
    fn thumbnail_lookup_is_logged_only() {
        let fx = fixture();
        let runner = FakeRunner::with_outputs(vec![
            Ok(ok_stdout(r#"[{"SourceFile":"p","IFD0:Make":"Canon"}]"#)),
            Ok(CommandOutput {
                status_code: 0,
                stdout: vec![0xFF, 0xD8, 0xFF],
                stderr: String::new(),
            }),
        ]);
        let output = bridge(&fx.binary, runner.clone())
            .process(&ExifToolRequest {
                file_path: Some(fx.image_path.clone()),
                extract_embedded: true,
                output_format: OutputFormat::CompactJson,
                ..ExifToolRequest::default()
            })
            .expect("read should succeed");

        let seen = runner.take_seen();
        assert_eq!(seen[1].args[..2].to_vec(), vec!["-b", "-ThumbnailImage"]);
        assert_eq!(output.metadata, r#"{"IFD0:Make":"Canon"}"#);
        assert!(output.debug_log.contains("Extracted embedded thumbnail (3 bytes)"));
    }

    #[test]
    fn group_selector_accepts_bare_and_qualified_groups() {
        assert_eq!(group_selector("EXIF"), "-EXIF:all");
        assert_eq!(group_selector(" XMP-dc:all "), "-XMP-dc:all");
        assert_eq!(group_selector("-IPTC"), "-IPTC:all");
    }

    #[test]
    fn rejects_non_array_tool_output() {
        let err = parse_tool_json(br#"{"a":1}"#).expect_err("object should be rejected");
        assert_eq!(err.kind, ErrorKind::Json);
        assert!(parse_tool_json(b"[]").expect("empty array").is_empty());
    }

    #[test]
    fn parses_operation_labels() {
        assert_eq!(
            "Read Specific Tags".parse::<Operation>().ok(),
            Some(Operation::ReadTags)
        );
        assert_eq!("write".parse::<Operation>().ok(), Some(Operation::Write));
        assert_eq!(parse_tag_names("Make\n\n Model \n"), vec!["Make", "Model"]);
    }
}
