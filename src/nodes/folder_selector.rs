use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{error, info};

use crate::debug_log::{format_kb, DebugLog};
use crate::error::{ErrorKind, NodeError, NodeResult};
use crate::image_buffer::{ImageBuffer, SELECTOR_SENTINEL_SIZE};
use crate::nodes::pattern::{collect_matches, parse_patterns, DEFAULT_PATTERNS};

pub const MAX_IMAGE_INDEX: usize = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Name,
    #[default]
    ModifiedTime,
    CreatedTime,
    Size,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ModifiedTime => "date_modified",
            Self::CreatedTime => "date_created",
            Self::Size => "size",
        }
    }
}

impl FromStr for SortKey {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "date_modified" | "modified" | "mtime" => Ok(Self::ModifiedTime),
            "date_created" | "created" | "ctime" => Ok(Self::CreatedTime),
            "size" => Ok(Self::Size),
            other => Err(NodeError::invalid_input(format!(
                "unknown sort key '{other}' (expected name|date_modified|date_created|size)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

impl FromStr for SortOrder {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(Self::Ascending),
            "descending" | "desc" => Ok(Self::Descending),
            other => Err(NodeError::invalid_input(format!(
                "unknown sort order '{other}' (expected ascending|descending)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSelectRequest {
    pub folder: PathBuf,
    pub index: usize,
    /// Comma-separated glob patterns.
    pub patterns: String,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub recursive: bool,
}

impl FolderSelectRequest {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            index: 0,
            patterns: String::from(DEFAULT_PATTERNS),
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            recursive: false,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.patterns = patterns.into();
        self
    }

    pub fn with_sort(mut self, sort_by: SortKey, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderSelection {
    pub image: ImageBuffer,
    /// Absolute path of the selected file; empty on failure.
    pub file_path: String,
    pub filename: String,
    pub debug_log: String,
    pub total_images: usize,
}

impl FolderSelection {
    fn sentinel(debug_log: String) -> Self {
        Self {
            image: ImageBuffer::blank(SELECTOR_SENTINEL_SIZE, SELECTOR_SENTINEL_SIZE),
            file_path: String::new(),
            filename: String::new(),
            debug_log,
            total_images: 0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.file_path.is_empty() && self.total_images == 0
    }
}

/// A matched file with the stat fields every sort key needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub created: SystemTime,
    pub size: u64,
}

impl FileEntry {
    fn stat(path: PathBuf) -> Result<Self, std::io::Error> {
        let meta = fs::metadata(&path)?;
        let modified = meta.modified()?;
        let created = meta.created().unwrap_or(modified);
        Ok(Self {
            path,
            modified,
            created,
            size: meta.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn compare(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Name => self
                .file_name()
                .to_lowercase()
                .cmp(&other.file_name().to_lowercase()),
            SortKey::ModifiedTime => self.modified.cmp(&other.modified),
            SortKey::CreatedTime => self.created.cmp(&other.created),
            SortKey::Size => self.size.cmp(&other.size),
        }
    }
}

/// Stable ascending sort by `key`; descending is the exact reverse of it.
pub fn sort_entries(entries: &mut [FileEntry], key: SortKey, order: SortOrder) {
    entries.sort_by(|a, b| a.compare(b, key));
    if order == SortOrder::Descending {
        entries.reverse();
    }
}

/// Validate the folder and return its matching files, sorted.
pub fn scan_folder(request: &FolderSelectRequest) -> NodeResult<Vec<FileEntry>> {
    let folder = request.folder.as_path();
    if !folder.exists() {
        return Err(NodeError::new(
            ErrorKind::NotFound,
            format!("Folder does not exist: {}", folder.display()),
        ));
    }
    if !folder.is_dir() {
        return Err(NodeError::new(
            ErrorKind::NotADirectory,
            format!("Path is not a folder: {}", folder.display()),
        ));
    }

    let patterns = parse_patterns(&request.patterns);
    let paths = collect_matches(folder, &patterns, request.recursive)
        .map_err(|e| NodeError::io(&format!("failed to scan {}", folder.display()), &e))?;
    let mut entries = paths
        .into_iter()
        .map(FileEntry::stat)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NodeError::io("failed to stat matched file", &e))?;

    if entries.is_empty() {
        return Err(NodeError::new(
            ErrorKind::NoMatches,
            format!(
                "No images found in folder: {}\nPattern: {}",
                folder.display(),
                request.patterns
            ),
        ));
    }

    sort_entries(&mut entries, request.sort_by, request.sort_order);
    Ok(entries)
}

/// A decoded file plus what the debug log reports about it.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
}

pub fn decode_image(path: &Path) -> NodeResult<DecodedImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| NodeError::io(&format!("failed to open {}", path.display()), &e))?
        .with_guessed_format()
        .map_err(|e| NodeError::io(&format!("failed to read {}", path.display()), &e))?;
    let format = reader.format();
    let image = reader.decode().map_err(|e| NodeError::decode(path, &e))?;
    Ok(DecodedImage { image, format })
}

/// Always returns a well-formed selection; every failure is logged and
/// yields the blank sentinel.
pub fn select_image_from_folder(request: &FolderSelectRequest) -> FolderSelection {
    let mut log = start_log(request);
    match try_select(request, &mut log) {
        Ok(selection) => selection,
        Err(err) => {
            error!(kind = err.kind.as_str(), error = %err, "folder image load failed");
            log.error(format!("Failed to load image: {err}"));
            FolderSelection::sentinel(log.into_string())
        }
    }
}

fn try_select(request: &FolderSelectRequest, log: &mut DebugLog) -> NodeResult<FolderSelection> {
    let entries = scan_folder(request)?;
    let total = entries.len();

    let Some(entry) = entries.get(request.index).filter(|_| request.index <= MAX_IMAGE_INDEX)
    else {
        return Err(NodeError::new(
            ErrorKind::IndexOutOfRange,
            format!(
                "Image index {} out of range. Folder contains {total} images (indices 0-{})",
                request.index,
                total - 1
            ),
        ));
    };

    let decoded = decode_image(&entry.path)?;
    let absolute = std::path::absolute(&entry.path)
        .map_err(|e| NodeError::io("failed to resolve absolute path", &e))?;
    let filename = entry.file_name();

    success_log(log, entry, &decoded, request, total);
    info!(
        file = %filename,
        position = request.index + 1,
        total,
        "loaded image from folder"
    );

    Ok(FolderSelection {
        image: ImageBuffer::from_dynamic(&decoded.image),
        file_path: absolute.to_string_lossy().to_string(),
        filename,
        debug_log: log.as_str().to_string(),
        total_images: total,
    })
}

fn start_log(request: &FolderSelectRequest) -> DebugLog {
    let mut log = DebugLog::new();
    log.banner()
        .line("LOCAL Image Loading from Folder")
        .rule()
        .line("Operation: Load image with metadata preservation")
        .line("Method: Direct file access")
        .blank()
        .line("Folder Settings:")
        .field("path", request.folder.display())
        .field("pattern", &request.patterns)
        .field("sort_by", request.sort_by.as_str())
        .field("sort_order", request.sort_order.as_str())
        .field("recursive", request.recursive)
        .banner()
        .line("Scanning folder for images...");
    log
}

fn success_log(
    log: &mut DebugLog,
    entry: &FileEntry,
    decoded: &DecodedImage,
    request: &FolderSelectRequest,
    total: usize,
) {
    let parent = entry
        .path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let format = decoded
        .format
        .map(|f| format!("{f:?}").to_uppercase())
        .unwrap_or_else(|| String::from("Unknown"));

    log.blank()
        .line(format!("Found {total} image(s) in folder"))
        .line(format!("Sorted by: {}", request.sort_by.as_str()))
        .blank()
        .banner()
        .line(format!("Loading image {} of {total}...", request.index + 1))
        .blank()
        .line("[OK] Image loaded successfully")
        .field("File", entry.file_name())
        .field("Path", parent)
        .field("Size", format_kb(entry.size))
        .field(
            "Dimensions",
            format!("{}x{}", decoded.image.width(), decoded.image.height()),
        )
        .field("Mode", format!("{:?}", decoded.image.color()))
        .field("Format", format)
        .blank()
        .line("[INFO] Use the file_path output with the ExifTool bridge")
        .line("       to read comprehensive metadata")
        .banner();
}
