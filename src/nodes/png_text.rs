use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use image::DynamicImage;

use crate::error::{NodeError, NodeResult};

/// Keyword under which generic readers look for an XMP packet.
pub const XMP_PACKET_KEYWORD: &str = "XML:com.adobe.xmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub keyword: String,
    pub text: String,
}

impl TextChunk {
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
        }
    }

    /// tEXt only carries Latin-1, and XMP packets are always iTXt.
    fn needs_itxt(&self) -> bool {
        self.keyword == XMP_PACKET_KEYWORD || self.text.chars().any(|c| u32::from(c) > 0xFF)
    }
}

/// Encode `image` as 8-bit RGB or RGBA PNG with `chunks` ahead of the pixel data.
pub fn write_png_with_text<W: Write>(
    image: &DynamicImage,
    chunks: &[TextChunk],
    sink: W,
) -> NodeResult<()> {
    let (color, data) = if image.color().has_alpha() {
        (png::ColorType::Rgba, image.to_rgba8().into_raw())
    } else {
        (png::ColorType::Rgb, image.to_rgb8().into_raw())
    };

    let mut encoder = png::Encoder::new(sink, image.width(), image.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);

    for chunk in chunks {
        let added = if chunk.needs_itxt() {
            encoder.add_itxt_chunk(chunk.keyword.clone(), chunk.text.clone())
        } else {
            encoder.add_text_chunk(chunk.keyword.clone(), chunk.text.clone())
        };
        added.map_err(|e| {
            NodeError::encode(format!("invalid text chunk '{}': {e}", chunk.keyword))
        })?;
    }

    let mut writer = encoder
        .write_header()
        .map_err(|e| NodeError::encode(format!("failed to write PNG header: {e}")))?;
    writer
        .write_image_data(&data)
        .map_err(|e| NodeError::encode(format!("failed to write PNG data: {e}")))?;
    writer
        .finish()
        .map_err(|e| NodeError::encode(format!("failed to finish PNG: {e}")))
}

pub fn save_png_with_text(image: &DynamicImage, chunks: &[TextChunk], path: &Path) -> NodeResult<()> {
    let file = File::create(path)
        .map_err(|e| NodeError::io(&format!("failed to create {}", path.display()), &e))?;
    let mut sink = BufWriter::new(file);
    write_png_with_text(image, chunks, &mut sink)?;
    sink.flush()
        .map_err(|e| NodeError::io(&format!("failed to flush {}", path.display()), &e))
}

/// Every tEXt, zTXt and iTXt chunk in a PNG file, in file order per kind.
pub fn read_png_text(path: &Path) -> NodeResult<Vec<TextChunk>> {
    let file = File::open(path)
        .map_err(|e| NodeError::io(&format!("failed to open {}", path.display()), &e))?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let reader = decoder
        .read_info()
        .map_err(|e| NodeError::encode(format!("failed to read PNG '{}': {e}", path.display())))?;
    let info = reader.info();

    let mut out = info
        .uncompressed_latin1_text
        .iter()
        .map(|c| TextChunk::new(c.keyword.clone(), c.text.clone()))
        .collect::<Vec<_>>();
    for chunk in &info.compressed_latin1_text {
        let text = chunk
            .get_text()
            .map_err(|e| NodeError::encode(format!("bad zTXt '{}': {e}", chunk.keyword)))?;
        out.push(TextChunk::new(chunk.keyword.clone(), text));
    }
    for chunk in &info.utf8_text {
        let text = chunk
            .get_text()
            .map_err(|e| NodeError::encode(format!("bad iTXt '{}': {e}", chunk.keyword)))?;
        out.push(TextChunk::new(chunk.keyword.clone(), text));
    }
    Ok(out)
}
