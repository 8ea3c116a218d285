//! Screenshot to PDF conversion
//!
//! A full-page bitmap is either placed on one page of its own size or cut
//! into horizontal bands, one per US Letter page. Bitmap pixels are treated
//! as CSS pixels: 1 px = 0.75 pt.

use crate::error::{RasterError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, instrument};

/// PDF points per CSS pixel (72 / 96)
pub const PT_PER_PX: f64 = 0.75;
/// PDF points per inch
pub const PT_PER_INCH: f64 = 72.0;
/// CSS pixels per inch
pub const PX_PER_INCH: f64 = 96.0;
/// US Letter width in points
pub const LETTER_WIDTH_PT: f64 = 612.0;
/// US Letter height in points
pub const LETTER_HEIGHT_PT: f64 = 792.0;

/// Default Letter margin in inches
pub const DEFAULT_MARGIN_INCHES: f64 = 0.5;
/// Widest margin that still leaves a printable content box
pub const MAX_MARGIN_INCHES: f64 = 4.0;

/// JPEG quality for embedded bands
const JPEG_QUALITY: u8 = 90;
/// Tallest strip a single JPEG may hold
const MAX_STRIP_PX: u32 = 65_000;

/// Letter page geometry for a bitmap of a given width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Margin on every side, in points
    pub margin_pt: f64,
    /// Printable width, in points
    pub content_width_pt: f64,
    /// Printable height, in points
    pub content_height_pt: f64,
    /// Output points per native point
    pub scale: f64,
    /// Bitmap rows per page
    pub band_height_px: u32,
}

/// Bring a margin into `0..=MAX_MARGIN_INCHES`; NaN becomes the default
pub fn clamp_margin(inches: f64) -> f64 {
    if inches.is_nan() {
        DEFAULT_MARGIN_INCHES
    } else {
        inches.clamp(0.0, MAX_MARGIN_INCHES)
    }
}

impl PageGeometry {
    /// Geometry for a bitmap `width_px` wide on Letter with `margin_in` margins
    pub fn letter(width_px: u32, margin_in: f64) -> Self {
        let margin_pt = clamp_margin(margin_in) * PT_PER_INCH;
        let content_width_pt = LETTER_WIDTH_PT - 2.0 * margin_pt;
        let content_height_pt = LETTER_HEIGHT_PT - 2.0 * margin_pt;
        let scale = content_width_pt / (f64::from(width_px.max(1)) * PT_PER_PX);
        let native_pt_per_page = content_height_pt / scale;
        let band = (native_pt_per_page * (PX_PER_INCH / PT_PER_INCH)).floor();
        let band_height_px = if band.is_finite() && band >= 1.0 {
            band.min(f64::from(u32::MAX)) as u32
        } else {
            1
        };

        Self {
            margin_pt,
            content_width_pt,
            content_height_pt,
            scale,
            band_height_px,
        }
    }

    /// Height in points of a band `rows` tall once drawn
    pub fn drawn_height_pt(&self, rows: u32) -> f64 {
        f64::from(rows) * PT_PER_PX * self.scale
    }
}

/// One horizontal slice of the bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// First row
    pub top: u32,
    /// Number of rows
    pub height: u32,
}

/// Consecutive bands covering `height_px` rows, each at most `band_height_px`
pub fn bands(height_px: u32, band_height_px: u32) -> Vec<Band> {
    let step = band_height_px.max(1);
    let mut out = Vec::with_capacity(height_px.div_ceil(step) as usize);
    let mut top = 0;
    while top < height_px {
        let height = step.min(height_px - top);
        out.push(Band { top, height });
        top += height;
    }
    out
}

/// Geometry and bands for paginating a `width_px` × `height_px` bitmap
pub fn band_plan(width_px: u32, height_px: u32, margin_in: f64) -> (PageGeometry, Vec<Band>) {
    let geometry = PageGeometry::letter(width_px, margin_in);
    let plan = bands(height_px, geometry.band_height_px);
    (geometry, plan)
}

/// Image placement on a page, in points
struct Placement {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Converts PNG screenshots into PDF documents
pub struct RasterPaginator;

impl RasterPaginator {
    /// One page exactly the size of the bitmap
    #[instrument(skip(png), fields(bytes = png.len()))]
    pub fn to_single_page_pdf(png: &[u8]) -> Result<Vec<u8>> {
        let image = decode(png)?;
        let (width, height) = image.dimensions();
        let page_w = f64::from(width) * PT_PER_PX;
        let page_h = f64::from(height) * PT_PER_PX;

        // Tall captures exceed JPEG's dimension limit; stack strips on the page
        let mut images = Vec::new();
        for strip in bands(height, MAX_STRIP_PX) {
            let strip_h = f64::from(strip.height) * PT_PER_PX;
            let top_pt = f64::from(strip.top) * PT_PER_PX;
            images.push((
                crop(&image, strip)?,
                Placement {
                    x: 0.0,
                    y: page_h - top_pt - strip_h,
                    width: page_w,
                    height: strip_h,
                },
            ));
        }

        let mut builder = PdfBuilder::new();
        builder.add_page(page_w, page_h, images)?;
        debug!("Single page PDF: {}x{} px", width, height);
        builder.finish()
    }

    /// US Letter pages, one band per page, top-aligned inside the margins
    #[instrument(skip(png), fields(bytes = png.len()))]
    pub fn to_paginated_pdf(png: &[u8], margin_in: f64) -> Result<Vec<u8>> {
        let image = decode(png)?;
        let (width, height) = image.dimensions();
        let (geometry, plan) = band_plan(width, height, margin_in);

        let mut builder = PdfBuilder::new();
        for band in &plan {
            let drawn_h = geometry.drawn_height_pt(band.height);
            let placement = Placement {
                x: geometry.margin_pt,
                y: LETTER_HEIGHT_PT - geometry.margin_pt - drawn_h,
                width: geometry.content_width_pt,
                height: drawn_h,
            };
            builder.add_page(
                LETTER_WIDTH_PT,
                LETTER_HEIGHT_PT,
                vec![(crop(&image, *band)?, placement)],
            )?;
        }
        debug!(
            "Paginated PDF: {}x{} px into {} pages of {} rows",
            width,
            height,
            plan.len(),
            geometry.band_height_px
        );
        builder.finish()
    }
}

fn decode(png: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| RasterError::DecodeFailed(e.to_string()))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RasterError::EmptyBitmap { width, height }.into());
    }
    Ok(image)
}

/// Crop a band and encode it as JPEG
fn crop(image: &RgbImage, band: Band) -> Result<EncodedImage> {
    let width = image.width();
    let view = image::imageops::crop_imm(image, 0, band.top, width, band.height).to_image();
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode_image(&view)
        .map_err(|e| RasterError::EncodeFailed(e.to_string()))?;
    Ok(EncodedImage {
        width,
        height: band.height,
        data,
    })
}

struct EncodedImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Minimal page tree writer for image-only documents
struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn add_page(
        &mut self,
        width_pt: f64,
        height_pt: f64,
        images: Vec<(EncodedImage, Placement)>,
    ) -> Result<()> {
        let mut xobjects = lopdf::Dictionary::new();
        let mut operations = Vec::new();

        for (idx, (image, at)) in images.into_iter().enumerate() {
            let name = format!("Im{}", idx);
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(image.width),
                    "Height" => i64::from(image.height),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8i64,
                    "Filter" => "DCTDecode",
                },
                image.data,
            )
            .with_compression(false);
            let image_id = self.doc.add_object(stream);
            xobjects.set(name.as_bytes().to_vec(), image_id);

            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    real(at.width),
                    real(0.0),
                    real(0.0),
                    real(at.height),
                    real(at.x),
                    real(at.y),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| RasterError::PdfFailed(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(width_pt), real(height_pt)],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| RasterError::PdfFailed(e.to_string()))?;
        Ok(out)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}
