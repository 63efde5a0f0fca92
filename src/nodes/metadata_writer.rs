use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::debug_log::{format_kb, preview, DebugLog};
use crate::error::{NodeError, NodeFailure, NodeResult};
use crate::image_buffer::ImageBuffer;
use crate::nodes::png_text::{save_png_with_text, TextChunk, XMP_PACKET_KEYWORD};

pub const DEFAULT_FILENAME_PREFIX: &str = "image";
pub const DOCUMENT_SCHEMA_VERSION: &str = "1.0";
pub const DOCUMENT_KEYWORD: &str = "XMP";
pub const NODE_MARKER_KEYWORD: &str = "MetadataNodes";
pub const NODE_MARKER_VALUE: &str = "SaveWithMetadata";
pub const SOFTWARE: &str = concat!("metadata-nodes ", env!("CARGO_PKG_VERSION"));
pub const MAX_RATING: u8 = 5;

const FAILURE_CONTEXT: &str = "Failed to save image with metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    #[default]
    None,
    Red,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl Label {
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Red,
        Self::Yellow,
        Self::Green,
        Self::Blue,
        Self::Purple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Red => "Red",
            Self::Yellow => "Yellow",
            Self::Green => "Green",
            Self::Blue => "Blue",
            Self::Purple => "Purple",
        }
    }

    fn as_option(self) -> Option<&'static str> {
        (self != Self::None).then(|| self.as_str())
    }
}

impl FromStr for Label {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                NodeError::invalid_input(format!(
                    "unknown label '{wanted}' (expected None|Red|Yellow|Green|Blue|Purple)"
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataWriteRequest {
    pub filename_prefix: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Comma-separated.
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub copyright: Option<String>,
    /// 0 means unrated.
    pub rating: u8,
    pub label: Label,
    /// Free-form JSON; stored as text when it does not parse.
    pub custom_metadata: Option<String>,
    /// Overrides the writer's default output directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for MetadataWriteRequest {
    fn default() -> Self {
        Self {
            filename_prefix: String::from(DEFAULT_FILENAME_PREFIX),
            title: None,
            description: None,
            keywords: None,
            creator: None,
            copyright: None,
            rating: 0,
            label: Label::None,
            custom_metadata: None,
            output_dir: None,
        }
    }
}

impl MetadataWriteRequest {
    fn title(&self) -> Option<&str> {
        present(&self.title)
    }

    fn description(&self) -> Option<&str> {
        present(&self.description)
    }

    fn keywords(&self) -> Option<&str> {
        present(&self.keywords)
    }

    fn creator(&self) -> Option<&str> {
        present(&self.creator)
    }

    fn copyright(&self) -> Option<&str> {
        present(&self.copyright)
    }

    fn rating(&self) -> Option<u8> {
        (self.rating > 0).then_some(self.rating)
    }

    fn custom_metadata(&self) -> Option<&str> {
        self.custom_metadata
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataDocument {
    pub xmp_version: String,
    pub created_date: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc: Option<DublinCore>,
    #[serde(rename = "xmp", skip_serializing_if = "Option::is_none")]
    pub basic: Option<XmpBasic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DublinCore {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,
}

impl DublinCore {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct XmpBasic {
    #[serde(rename = "Rating", skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(rename = "Label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn build_metadata_document(
    request: &MetadataWriteRequest,
    created_at: DateTime<Utc>,
) -> MetadataDocument {
    let dc = DublinCore {
        title: request.title().map(str::to_string),
        description: request.description().map(str::to_string),
        subject: request.keywords().map(split_keywords),
        creator: request.creator().map(str::to_string),
        rights: request.copyright().map(str::to_string),
    };
    let basic = XmpBasic {
        rating: request.rating(),
        label: request.label.as_option().map(str::to_string),
    };

    let (custom, custom_text) = match request.custom_metadata() {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => (Some(parsed), None),
            Err(_) => (None, Some(raw.to_string())),
        },
        None => (None, None),
    };

    MetadataDocument {
        xmp_version: String::from(DOCUMENT_SCHEMA_VERSION),
        created_date: created_at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        tool: String::from(SOFTWARE),
        dc: (!dc.is_empty()).then_some(dc),
        basic: (basic != XmpBasic::default()).then_some(basic),
        custom,
        custom_text,
    }
}

/// Standard RDF/XML packet with the Dublin Core and XMP basic fields, for
/// readers that do not understand the JSON document. `None` when neither
/// block has content.
pub fn build_xmp_packet(document: &MetadataDocument) -> Option<String> {
    if document.dc.is_none() && document.basic.is_none() {
        return None;
    }

    let mut body = String::new();
    if let Some(dc) = document.dc.as_ref() {
        if let Some(title) = dc.title.as_deref() {
            body.push_str(&lang_alt("dc:title", title));
        }
        if let Some(description) = dc.description.as_deref() {
            body.push_str(&lang_alt("dc:description", description));
        }
        if let Some(subject) = dc.subject.as_ref().filter(|s| !s.is_empty()) {
            body.push_str(&rdf_list("dc:subject", "rdf:Bag", subject));
        }
        if let Some(creator) = dc.creator.as_deref() {
            body.push_str(&rdf_list("dc:creator", "rdf:Seq", &[creator.to_string()]));
        }
        if let Some(rights) = dc.rights.as_deref() {
            body.push_str(&lang_alt("dc:rights", rights));
        }
    }
    if let Some(basic) = document.basic.as_ref() {
        if let Some(rating) = basic.rating {
            body.push_str(&format!("   <xmp:Rating>{rating}</xmp:Rating>\n"));
        }
        if let Some(label) = basic.label.as_deref() {
            body.push_str(&format!("   <xmp:Label>{}</xmp:Label>\n", escape_xml(label)));
        }
    }

    Some(format!(
        concat!(
            "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
            "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n",
            " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
            "  <rdf:Description rdf:about=\"\"\n",
            "    xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n",
            "    xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\">\n",
            "{body}",
            "  </rdf:Description>\n",
            " </rdf:RDF>\n",
            "</x:xmpmeta>\n",
            "<?xpacket end=\"w\"?>"
        ),
        body = body
    ))
}

fn lang_alt(tag: &str, value: &str) -> String {
    format!(
        "   <{tag}><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></{tag}>\n",
        escape_xml(value)
    )
}

fn rdf_list(tag: &str, container: &str, items: &[String]) -> String {
    let items = items
        .iter()
        .map(|item| format!("<rdf:li>{}</rdf:li>", escape_xml(item)))
        .collect::<String>();
    format!("   <{tag}><{container}>{items}</{container}></{tag}>\n")
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Every text chunk written alongside the pixels.
pub fn build_text_chunks(
    request: &MetadataWriteRequest,
    document: &MetadataDocument,
) -> NodeResult<Vec<TextChunk>> {
    let mut chunks = Vec::new();
    if let Some(title) = request.title() {
        chunks.push(TextChunk::new("Title", title));
    }
    if let Some(description) = request.description() {
        chunks.push(TextChunk::new("Description", description));
    }
    if let Some(creator) = request.creator() {
        chunks.push(TextChunk::new("Author", creator));
    }
    if let Some(copyright) = request.copyright() {
        chunks.push(TextChunk::new("Copyright", copyright));
    }

    let json = serde_json::to_string_pretty(document)
        .map_err(|e| NodeError::json(format!("failed to serialize metadata document: {e}")))?;
    chunks.push(TextChunk::new(DOCUMENT_KEYWORD, json));
    if let Some(packet) = build_xmp_packet(document) {
        chunks.push(TextChunk::new(XMP_PACKET_KEYWORD, packet));
    }
    chunks.push(TextChunk::new(NODE_MARKER_KEYWORD, NODE_MARKER_VALUE));
    chunks.push(TextChunk::new("Software", SOFTWARE));
    Ok(chunks)
}

pub fn filename_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// First `{prefix}_{timestamp}_{counter:05}.png` in `dir` that does not exist yet.
///
/// The scan is not atomic: two writers sharing a directory and a timestamp
/// second can pick the same name.
pub fn next_available_path(dir: &Path, prefix: &str, timestamp: &str) -> PathBuf {
    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{prefix}_{timestamp}_{counter:05}.png"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub file_path: String,
    pub debug_log: String,
}

/// Writes images into a host-managed default directory unless a request
/// overrides it.
#[derive(Debug, Clone)]
pub struct MetadataWriter {
    default_output_dir: PathBuf,
}

impl MetadataWriter {
    pub fn new(default_output_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_output_dir: default_output_dir.into(),
        }
    }

    pub fn save(
        &self,
        image: &ImageBuffer,
        request: &MetadataWriteRequest,
    ) -> Result<SavedImage, NodeFailure> {
        let mut log = start_log(request);
        match self.try_save(image, request, &mut log) {
            Ok(path) => {
                info!(path = %path.display(), "saved image with metadata");
                Ok(SavedImage {
                    file_path: path.to_string_lossy().to_string(),
                    debug_log: log.into_string(),
                })
            }
            Err(err) => {
                error!(kind = err.kind.as_str(), error = %err, "failed to save image with metadata");
                log.blank()
                    .banner()
                    .line(format!("[ERROR] {FAILURE_CONTEXT}"))
                    .field("Error", &err)
                    .banner();
                Err(NodeFailure {
                    context: FAILURE_CONTEXT,
                    error: err,
                    debug_log: log.into_string(),
                })
            }
        }
    }

    fn try_save(
        &self,
        image: &ImageBuffer,
        request: &MetadataWriteRequest,
        log: &mut DebugLog,
    ) -> NodeResult<PathBuf> {
        if request.rating > MAX_RATING {
            return Err(NodeError::invalid_input(format!(
                "rating must be between 0 and {MAX_RATING}, got {}",
                request.rating
            )));
        }

        let output_dir = self.resolve_output_dir(request);
        fs::create_dir_all(&output_dir).map_err(|e| {
            NodeError::io(
                &format!("failed to create output directory {}", output_dir.display()),
                &e,
            )
        })?;

        let path = next_available_path(
            &output_dir,
            &request.filename_prefix,
            &filename_timestamp(Local::now()),
        );
        let document = build_metadata_document(request, Utc::now());
        let chunks = build_text_chunks(request, &document)?;
        save_png_with_text(&image.to_dynamic(), &chunks, &path)?;

        let size = fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| NodeError::io("failed to stat saved image", &e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        log.blank()
            .banner()
            .line("Saving image with metadata...")
            .blank()
            .line("[OK] Image saved successfully")
            .field("File", file_name)
            .field("Path", output_dir.display())
            .field("Size", format_kb(size))
            .banner();
        Ok(path)
    }

    fn resolve_output_dir(&self, request: &MetadataWriteRequest) -> PathBuf {
        request
            .output_dir
            .as_ref()
            .filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
            .cloned()
            .unwrap_or_else(|| self.default_output_dir.clone())
    }
}

fn start_log(request: &MetadataWriteRequest) -> DebugLog {
    let mut log = DebugLog::new();
    log.banner()
        .line("LOCAL Image Save with XMP Metadata")
        .rule()
        .line("Operation: Save image with embedded XMP metadata")
        .line("Method: Local (PNG text chunks)")
        .blank()
        .line("File Settings:")
        .field("filename_prefix", &request.filename_prefix)
        .field(
            "output_path",
            request
                .output_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| String::from("[default output folder]")),
        )
        .field("format", "PNG")
        .blank()
        .line("Metadata Fields:");

    let mut count = 0usize;
    if let Some(title) = request.title() {
        log.field("title", title);
        count += 1;
    }
    if let Some(description) = request.description() {
        log.field("description", preview(description, 50));
        count += 1;
    }
    if let Some(keywords) = request.keywords() {
        log.field("keywords", keywords);
        count += 1;
    }
    if let Some(creator) = request.creator() {
        log.field("creator", creator);
        count += 1;
    }
    if let Some(copyright) = request.copyright() {
        log.field("copyright", copyright);
        count += 1;
    }
    if let Some(rating) = request.rating() {
        log.field("rating", format!("{rating}/{MAX_RATING} stars"));
        count += 1;
    }
    if let Some(label) = request.label.as_option() {
        log.field("label", label);
        count += 1;
    }
    if request.custom_metadata().is_some() {
        log.field("custom_metadata", "[JSON data provided]");
        count += 1;
    }

    if count == 0 {
        log.line("  [No metadata provided - saving without XMP]");
    } else {
        log.blank().line(format!("Total metadata fields: {count}"));
    }
    log.banner().line("Preparing to save...");
    log
}
