use crate::configuration::ContractorConfig;
use crate::estimate::{DiscountType, Estimate};
use ::image::codecs::jpeg::JpegDecoder;
use ::image::io::Reader as ImageReader;
use printpdf::*;
use serde::Deserialize;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF render error: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfTemplate {
    /// Text-only header with the contractor block.
    Modern,
    /// Letterhead image band across the top when the asset is available.
    Classic,
}

impl Default for PdfTemplate {
    fn default() -> Self {
        PdfTemplate::Modern
    }
}

pub fn create_estimate_pdf(
    estimate_number: &str,
    date: &str,
    estimate: &Estimate,
    contractor: &ContractorConfig,
    template: PdfTemplate,
    letterhead: Option<&str>,
) -> Result<Vec<u8>, PdfError> {
    let (doc, page1, layer1) = PdfDocument::new("Estimate", Mm(210.0), Mm(297.0), "Layer 1");
    let current_layer = doc.get_page(page1).get_layer(layer1);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PdfError::Render(e.to_string()))?;
    let font_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PdfError::Render(e.to_string()))?;

    match template {
        PdfTemplate::Classic => {
            if let Some(path) = letterhead {
                // A failed letterhead never fails the document.
                if let Err(e) = add_letterhead(&doc, page1, layer1, path) {
                    warn!("skipping letterhead: {}", e);
                }
            }
        }
        PdfTemplate::Modern => {
            current_layer.use_text(&contractor.name, 14.0, Mm(10.0), Mm(280.0), &font_bold);
            current_layer.use_text(&contractor.address, 9.0, Mm(10.0), Mm(274.0), &font);
            current_layer.use_text(
                format!("{} | {}", contractor.phone, contractor.email),
                9.0,
                Mm(10.0),
                Mm(269.0),
                &font,
            );
        }
    }

    current_layer.use_text(estimate_number, 10.0, Mm(10.0), Mm(250.0), &font);
    current_layer.use_text(date, 10.0, Mm(157.0), Mm(250.0), &font);

    if let Some(client) = &estimate.client {
        current_layer.use_text("Prepared for:", 9.0, Mm(10.0), Mm(240.0), &font_bold);
        let mut y = 235.0;
        current_layer.use_text(&client.name, 10.0, Mm(10.0), Mm(y), &font);
        if let Some(address) = &client.address {
            y -= 5.0;
            current_layer.use_text(address, 9.0, Mm(10.0), Mm(y), &font);
        }
        if let Some(email) = &client.email {
            y -= 5.0;
            current_layer.use_text(email, 9.0, Mm(10.0), Mm(y), &font);
        }
    }

    if !estimate.project_description.is_empty() {
        current_layer.use_text(
            &estimate.project_description,
            9.0,
            Mm(10.0),
            Mm(215.0),
            &font,
        );
    }

    let header_y = Mm(205.0);
    current_layer.use_text("Item", 10.0, Mm(10.0), header_y, &font_bold);
    current_layer.use_text("Qty", 10.0, Mm(110.0), header_y, &font_bold);
    current_layer.use_text("Unit", 10.0, Mm(127.0), header_y, &font_bold);
    current_layer.use_text("Rate", 10.0, Mm(147.0), header_y, &font_bold);
    current_layer.use_text("Amount", 10.0, Mm(170.0), header_y, &font_bold);

    let mut y_pos = 197.0;
    for item in &estimate.items {
        let label = if item.description.is_empty() {
            item.name.clone()
        } else {
            format!("{} - {}", item.name, item.description)
        };
        current_layer.use_text(&label, 9.0, Mm(10.0), Mm(y_pos), &font);
        current_layer.use_text(
            format!("{:.2}", item.quantity),
            9.0,
            Mm(110.0),
            Mm(y_pos),
            &font,
        );
        current_layer.use_text(&item.unit, 9.0, Mm(127.0), Mm(y_pos), &font);
        current_layer.use_text(
            format!("{:.2}", item.unit_price),
            9.0,
            Mm(147.0),
            Mm(y_pos),
            &font,
        );
        current_layer.use_text(
            format!("{:.2}", item.total),
            9.0,
            Mm(170.0),
            Mm(y_pos),
            &font,
        );
        y_pos -= 7.0;
    }

    y_pos -= 7.0;
    current_layer.use_text(
        format!("Subtotal: {:.2}", estimate.totals.subtotal),
        10.0,
        Mm(140.0),
        Mm(y_pos),
        &font_bold,
    );

    if estimate.totals.discount_amount != 0.0 {
        y_pos -= 7.0;
        let discount_label = match estimate.discount_type {
            DiscountType::Percentage => format!(
                "Discount ({}%): -{:.2}",
                estimate.discount_value, estimate.totals.discount_amount
            ),
            DiscountType::Fixed => {
                format!("Discount: -{:.2}", estimate.totals.discount_amount)
            }
        };
        current_layer.use_text(discount_label, 10.0, Mm(140.0), Mm(y_pos), &font);
    }

    y_pos -= 7.0;
    current_layer.use_text(
        format!("Tax @ {}%: {:.2}", estimate.tax_rate, estimate.totals.tax),
        10.0,
        Mm(140.0),
        Mm(y_pos),
        &font,
    );
    y_pos -= 7.0;
    current_layer.use_text(
        format!("Total: {:.2}", estimate.totals.total),
        10.0,
        Mm(140.0),
        Mm(y_pos),
        &font_bold,
    );

    let mut buffer = BufWriter::new(Vec::new());
    doc.save(&mut buffer)
        .map_err(|e| PdfError::Render(e.to_string()))?;
    buffer
        .into_inner()
        .map_err(|e| PdfError::Render(e.to_string()))
}

fn add_letterhead(
    doc: &PdfDocumentReference,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    path: &str,
) -> Result<(), PdfError> {
    let img_info = ImageReader::open(path)
        .map_err(|e| PdfError::Render(e.to_string()))?
        .decode()
        .map_err(|e| PdfError::Render(e.to_string()))?
        .to_rgb8();
    let (width_px, height_px) = (img_info.width() as f32, img_info.height() as f32);

    let mut image_file =
        std::fs::File::open(Path::new(path)).map_err(|e| PdfError::Render(e.to_string()))?;
    let decoder =
        JpegDecoder::new(&mut image_file).map_err(|e| PdfError::Render(e.to_string()))?;
    let img = Image::try_from(decoder).map_err(|e| PdfError::Render(e.to_string()))?;

    let page_width_mm = 210.0;
    let page_height_mm = 297.0;

    // Scale to full page width at 96 DPI, keeping the aspect ratio.
    let scale = page_width_mm / (width_px * 25.4 / 96.0);
    let scaled_height_mm = height_px * scale * 25.4 / 96.0;

    let transform = ImageTransform {
        translate_x: Some(Mm(0.0)),
        translate_y: Some(Mm((page_height_mm - scaled_height_mm) as f64)),
        rotate: None,
        scale_x: Some(scale as f64),
        scale_y: Some(scale as f64),
        dpi: Some(96.0),
    };

    img.add_to_layer(doc.get_page(page).get_layer(layer), transform);
    Ok(())
}
