use std::fs;

use metadata_nodes::nodes::metadata_writer::{DOCUMENT_KEYWORD, NODE_MARKER_KEYWORD};
use metadata_nodes::nodes::png_text::{read_png_text, XMP_PACKET_KEYWORD};
use metadata_nodes::nodes::{Label, MetadataWriteRequest, MetadataWriter};
use metadata_nodes::{ErrorKind, ImageBuffer};
use pretty_assertions::assert_eq;
use serde_json::Value;

fn request(title: &str) -> MetadataWriteRequest {
    MetadataWriteRequest {
        filename_prefix: String::from("shot"),
        title: Some(String::from(title)),
        keywords: Some(String::from("sunset, beach ,, sea")),
        rating: 3,
        label: Label::Blue,
        custom_metadata: Some(String::from(r#"{"seed": 42}"#)),
        ..MetadataWriteRequest::default()
    }
}

#[test]
fn saved_png_carries_the_metadata_document() {
    let dir = tempfile::tempdir().expect("tempdir should exist");
    let writer = MetadataWriter::new(dir.path());
    let saved = writer
        .save(&ImageBuffer::blank(6, 4), &request("T"))
        .expect("save should succeed");

    let path = std::path::PathBuf::from(&saved.file_path);
    assert_eq!(path.parent(), Some(dir.path()));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name should be utf-8");
    assert!(name.starts_with("shot_") && name.ends_with("_00001.png"));

    let chunks = read_png_text(&path).expect("chunks should read");
    let text = |keyword: &str| {
        chunks
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| c.text.clone())
    };
    assert_eq!(text("Title").as_deref(), Some("T"));
    assert!(text(NODE_MARKER_KEYWORD).is_some());
    assert!(text(XMP_PACKET_KEYWORD)
        .expect("xmp packet should exist")
        .contains("<xmp:Rating>3</xmp:Rating>"));

    let document: Value = serde_json::from_str(
        &text(DOCUMENT_KEYWORD).expect("document chunk should exist"),
    )
    .expect("document should be json");
    assert_eq!(document["dc"]["title"], "T");
    assert_eq!(document["dc"]["subject"], serde_json::json!(["sunset", "beach", "sea"]));
    assert_eq!(document["xmp"]["Rating"], 3);
    assert_eq!(document["xmp"]["Label"], "Blue");
    assert_eq!(document["custom"]["seed"], 42);

    let decoded = image::open(&path).expect("saved file should decode");
    assert_eq!((decoded.width(), decoded.height()), (6, 4));
}

#[test]
fn repeated_saves_never_overwrite() {
    let dir = tempfile::tempdir().expect("tempdir should exist");
    let writer = MetadataWriter::new(dir.path());
    let image = ImageBuffer::blank(2, 2);
    let mut paths = Vec::new();
    for _ in 0..3 {
        paths.push(
            writer
                .save(&image, &request("again"))
                .expect("save should succeed")
                .file_path,
        );
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3);
    assert_eq!(fs::read_dir(dir.path()).expect("dir should list").count(), 3);
}

#[test]
fn request_output_dir_overrides_the_default() {
    let default_dir = tempfile::tempdir().expect("tempdir should exist");
    let override_dir = tempfile::tempdir().expect("tempdir should exist");
    let writer = MetadataWriter::new(default_dir.path());
    let saved = writer
        .save(
            &ImageBuffer::blank(1, 1),
            &MetadataWriteRequest {
                output_dir: Some(override_dir.path().join("nested")),
                ..MetadataWriteRequest::default()
            },
        )
        .expect("save should succeed");
    assert!(saved
        .file_path
        .starts_with(&*override_dir.path().join("nested").to_string_lossy()));
    assert!(saved.debug_log.contains("No metadata provided"));
}

#[test]
fn invalid_rating_fails_with_context() {
    let dir = tempfile::tempdir().expect("tempdir should exist");
    let failure = MetadataWriter::new(dir.path())
        .save(
            &ImageBuffer::blank(1, 1),
            &MetadataWriteRequest {
                rating: 9,
                ..MetadataWriteRequest::default()
            },
        )
        .expect_err("rating 9 should fail");
    assert_eq!(failure.kind(), ErrorKind::InvalidInput);
    assert!(failure
        .to_string()
        .starts_with("Failed to save image with metadata: "));
}
