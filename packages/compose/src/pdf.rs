//! PDF encoding via `printpdf`.
//!
//! One PDF page per [`Page`]: the canvas fills the page at the page's DPI
//! and the title is drawn as text so it stays selectable.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument};

use crate::{ComposeError, Document, DocumentWriter, Page};

const MM_PER_INCH: f32 = 25.4;

/// Writes documents as PDF files.
#[derive(Debug, Clone)]
pub struct PdfWriter {
    path: PathBuf,
}

impl PdfWriter {
    /// Creates a writer targeting `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes `document` as PDF bytes.
    ///
    /// Pages are consumed one at a time, so each canvas is freed once it
    /// has been embedded.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Pdf`] if `printpdf` fails.
    pub fn encode(document: Document) -> Result<Vec<u8>, ComposeError> {
        let Document { title, pages } = document;
        let Some(first) = pages.first() else {
            return Err(ComposeError::Pdf("document has no pages".to_owned()));
        };

        let (width, height) = page_size(first);
        let (doc, first_page, first_layer) = PdfDocument::new(title.as_str(), width, height, "Map");
        let font = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ComposeError::Pdf(e.to_string()))?;

        for (index, page) in pages.into_iter().enumerate() {
            let (width, height) = page_size(&page);
            let (page_index, layer_index) = if index == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(width, height, "Map")
            };
            let layer = doc.get_page(page_index).get_layer(layer_index);

            let Page {
                kind,
                title,
                canvas,
                dpi,
                title_placement,
            } = page;

            let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(canvas));
            #[allow(clippy::cast_precision_loss)]
            image.add_to_layer(
                layer.clone(),
                ImageTransform {
                    dpi: Some(dpi as f32),
                    ..ImageTransform::default()
                },
            );

            if !title.is_empty() {
                let x = px_to_mm(title_placement.x, dpi);
                let y = Mm(height.0 - px_to_mm(title_placement.y, dpi).0);
                #[allow(clippy::cast_possible_truncation)]
                layer.use_text(title.as_str(), title_placement.size as f32, x, y, &font);
            }

            log::debug!("Encoded page {} ({kind:?})", index + 1);
        }

        doc.save_to_bytes()
            .map_err(|e| ComposeError::Pdf(e.to_string()))
    }
}

impl DocumentWriter for PdfWriter {
    fn write(&self, document: Document) -> Result<(), ComposeError> {
        let pages = document.pages.len();
        let bytes = Self::encode(document)?;
        std::fs::write(&self.path, &bytes).map_err(|e| ComposeError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        log::info!(
            "Wrote {pages} page(s) ({} KiB) to {}",
            bytes.len() / 1024,
            self.path.display()
        );
        Ok(())
    }
}

fn page_size(page: &Page) -> (Mm, Mm) {
    let (width, height) = page.canvas.dimensions();
    (px_to_mm(width, page.dpi), px_to_mm(height, page.dpi))
}

#[allow(clippy::cast_precision_loss)]
fn px_to_mm(px: u32, dpi: u32) -> Mm {
    Mm(px as f32 / dpi.max(1) as f32 * MM_PER_INCH)
}

#[cfg(test)]
mod tests {
    use uprn_maps_models::GroupKey;

    use super::*;
    use crate::tests::{template, tile};
    use crate::{PageKind, compose_page, finalize};

    fn document() -> Document {
        finalize(
            "Test run",
            vec![
                compose_page(
                    PageKind::Group(GroupKey::Postcode("AB1".to_owned())),
                    "High St, Town, AB1",
                    vec![tile(1750, 80, 120, [10, 20, 30])],
                    &template(),
                )
                .unwrap(),
                compose_page(PageKind::Overview, "Overview", Vec::new(), &template()).unwrap(),
            ],
        )
    }

    #[test]
    fn encodes_pdf_bytes() {
        let bytes = PdfWriter::encode(document()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_document_is_an_error() {
        let empty = finalize("Empty", Vec::new());
        assert!(matches!(PdfWriter::encode(empty), Err(ComposeError::Pdf(_))));
    }

    #[test]
    fn page_size_follows_pixels_and_dpi() {
        let page = compose_page(PageKind::Overview, "", Vec::new(), &template()).unwrap();
        let (width, height) = page_size(&page);
        // 200 x 300 px at 72 dpi
        assert!((width.0 - 70.555_55).abs() < 0.01);
        assert!((height.0 - 105.833_33).abs() < 0.01);
    }

    #[test]
    fn writes_file() {
        let path = std::env::temp_dir().join("uprn_maps_compose_test.pdf");
        let writer = PdfWriter::new(&path);
        writer.write(document()).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(b"%PDF"));
        let _ = std::fs::remove_file(&path);
    }
}
