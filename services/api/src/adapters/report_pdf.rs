//! services/api/src/adapters/report_pdf.rs
//!
//! Renders the closeout report with `printpdf`. It implements the
//! `ReportRenderer` port from the `core` crate.
//!
//! The layout is a single top-to-bottom pass: header band, demographics,
//! clinical summary, detected disorders, recommended treatments, an optional
//! analytics page for prerendered charts and a footer band on the last page.

use async_trait::async_trait;
use mindspark_core::{
    domain::ClinicalReport,
    ports::{PortError, PortResult, ReportRenderer},
};
use printpdf::{
    image_crate::codecs::png::PngDecoder, path::PaintMode, BuiltinFont, Color, Image, ImageTransform,
    IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};
use regex::Regex;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

// US Letter, in millimetres.
const PAGE_W: f32 = 215.9;
const PAGE_H: f32 = 279.4;
const MARGIN: f32 = 17.6;
const HEADER_H: f32 = 31.75;
const FOOTER_H: f32 = 17.6;
const SECTION_X: f32 = 21.2;
const BODY_X: f32 = 24.7;

const BRAND: (f32, f32, f32) = (44.0, 91.0, 156.0);
const TREATMENT_BAND: (f32, f32, f32) = (223.0, 240.0, 216.0);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const WHITE: (f32, f32, f32) = (255.0, 255.0, 255.0);

static DOWNLOAD_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Download PDF Report.*$").expect("marker pattern is valid"));

/// Errors raised while laying out the document.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("Render task failed: {0}")]
    Task(String),
}

impl From<ReportError> for PortError {
    fn from(e: ReportError) -> Self {
        PortError::Unexpected(e.to_string())
    }
}

/// Where the optional images live on disk.
#[derive(Clone, Debug)]
pub struct ReportAssets {
    pub logo: PathBuf,
    pub bar_chart: PathBuf,
    pub pie_chart: PathBuf,
}

impl ReportAssets {
    pub fn under(assets_dir: &Path) -> Self {
        let uploads = assets_dir.join("uploads");
        Self {
            logo: uploads.join("Uet.png"),
            bar_chart: uploads.join("disorder_bar_chart.png"),
            pie_chart: uploads.join("treatment_pie_chart.png"),
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct PdfReportRenderer {
    assets: ReportAssets,
}

impl PdfReportRenderer {
    pub fn new(assets: ReportAssets) -> Self {
        Self { assets }
    }
}

#[async_trait]
impl ReportRenderer for PdfReportRenderer {
    /// Layout is CPU bound and reads images from disk, so it runs on the blocking pool.
    async fn render(&self, report: &ClinicalReport) -> PortResult<Vec<u8>> {
        let report = report.clone();
        let assets = self.assets.clone();
        let pdf = tokio::task::spawn_blocking(move || render_report(&report, &assets))
            .await
            .map_err(|e| ReportError::Task(e.to_string()))??;
        Ok(pdf)
    }
}

//=========================================================================================
// Layout
//=========================================================================================

/// Drops a trailing "Download PDF Report ..." marker the summary may echo back.
pub fn strip_download_marker(summary: &str) -> String {
    DOWNLOAD_MARKER.replace(summary, "").into_owned()
}

/// One line of text as placed on the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedText {
    /// One-based page number.
    pub page: usize,
    pub text: String,
}

/// What the layout pass put on the document.
#[derive(Debug, Default)]
pub struct Layout {
    pub pages: usize,
    pub lines: Vec<PlacedText>,
}

impl Layout {
    pub fn contains(&self, text: &str) -> bool {
        self.lines.iter().any(|line| line.text == text)
    }
}

pub fn render_report(report: &ClinicalReport, assets: &ReportAssets) -> Result<Vec<u8>, ReportError> {
    let (doc, _) = compose(report, assets)?;
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))
}

/// Lays the report out and returns the document with a record of its text.
pub fn compose(
    report: &ClinicalReport,
    assets: &ReportAssets,
) -> Result<(PdfDocumentReference, Layout), ReportError> {
    let (doc, page, layer) = PdfDocument::new("Patient's Medical Report", Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut page = ReportPage {
        doc: &doc,
        layer,
        regular,
        bold,
        cursor: 0.0,
        layout: Layout {
            pages: 1,
            lines: Vec::new(),
        },
    };

    // --- Header band ---
    page.fill_rect(0.0, 0.0, PAGE_W, HEADER_H, BRAND);
    let logo = load_png(&assets.logo);
    if let Some(bytes) = &logo {
        page.image_at(bytes, 7.0, 7.0, 21.2);
    }
    page.centered_at("MINDSPARK", 26.0, 10.6 + pt(26.0), true, WHITE);
    page.centered_at("Patient's Medical Report", 18.0, 10.6 + pt(26.0) + pt(18.0 * 1.3), true, WHITE);
    if let Some(bytes) = &logo {
        page.image_at(bytes, PAGE_W - 28.2, 7.0, 21.2);
    }
    page.cursor = HEADER_H + 8.0;

    // --- Patient demographics ---
    page.heading("Patient Demographics");
    let name = report.patient_name.as_deref().filter(|n| !n.is_empty()).unwrap_or("N/A");
    let age = report.patient_age.as_deref().filter(|a| !a.is_empty()).unwrap_or("N/A");
    page.line(&format!("Name: {}", name), 14.0, BODY_X, false, BLACK);
    page.line(&format!("Age: {}", age), 14.0, BODY_X, false, BLACK);
    page.move_down(2.0, 14.0);

    // --- Clinical summary ---
    page.heading("Clinical Summary");
    page.paragraph(&strip_download_marker(&report.summary), 12.0, SECTION_X, 176.4, false, BLACK);
    page.move_down(2.0, 12.0);

    // --- Detected disorders ---
    page.heading("Detected Disorders");
    if report.disorders.is_empty() {
        page.line("No disorders detected.", 12.0, BODY_X, false, BLACK);
    } else {
        for (index, disorder) in report.disorders.iter().enumerate() {
            page.paragraph(&format!("{}. {}", index + 1, disorder), 14.0, 26.5, 170.0, false, BLACK);
            page.move_down(0.5, 14.0);
        }
    }
    page.move_down(1.5, 14.0);

    // --- Recommended treatments ---
    page.heading("Recommended Treatments");
    if report.treatments.is_empty() {
        page.paragraph("No specific treatments available.", 12.0, BODY_X, 176.4, false, BLACK);
    } else {
        for treatment in &report.treatments {
            page.reserve(8.8 + pt(14.0 * 1.2) * 2.0);
            page.fill_rect(SECTION_X, page.cursor, 176.4, 8.8, TREATMENT_BAND);
            page.text_at(&treatment.disorder, 14.0, 22.9, page.cursor + 1.8 + pt(14.0), true, BRAND);
            page.cursor += 8.8 + 1.8;
            let text = treatment
                .recommendation
                .as_deref()
                .unwrap_or("No specific treatment found.");
            page.paragraph(text, 14.0, 28.2, 158.8, false, BLACK);
            page.move_down(1.5, 14.0);
        }
    }

    // --- Optional analytics page ---
    let bar_chart = load_png(&assets.bar_chart);
    let pie_chart = load_png(&assets.pie_chart);
    if bar_chart.is_some() || pie_chart.is_some() {
        page.new_page();
        page.centered_line("Visual Analytics", 18.0, true, BRAND);
        page.move_down(1.0, 18.0);
        if let Some(bytes) = &bar_chart {
            page.centered_line("Detected Disorders", 14.0, false, BLACK);
            page.move_down(0.5, 14.0);
            page.image_flow(bytes, 158.8);
            page.move_down(2.0, 14.0);
        }
        if let Some(bytes) = &pie_chart {
            page.centered_line("Treatment Distribution", 14.0, false, BLACK);
            page.move_down(0.5, 14.0);
            page.image_flow(bytes, 141.1);
            page.move_down(2.0, 14.0);
        }
    }

    // --- Footer on the final page ---
    if page.cursor > PAGE_H - FOOTER_H - 4.0 {
        page.new_page();
    }
    page.fill_rect(0.0, PAGE_H - FOOTER_H, PAGE_W, FOOTER_H, BRAND);
    page.text_at("MindSpark - AI Psychiatric Assistant", 10.0, SECTION_X, PAGE_H - 14.1 + pt(10.0), false, WHITE);
    page.text_at("Contact: support@mindspark.ai", 10.0, SECTION_X, PAGE_H - 8.8 + pt(10.0), false, WHITE);

    let layout = page.layout;
    Ok((doc, layout))
}

/// Points to millimetres.
fn pt(points: f32) -> f32 {
    points * 0.352_778
}

fn rgb((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r / 255.0, g / 255.0, b / 255.0, None))
}

/// Builtin fonts carry no metrics here; half an em per glyph is close enough
/// for centring and wrapping Helvetica.
fn estimated_width(text: &str, size: f32, bold: bool) -> f32 {
    let per_char = if bold { 0.56 } else { 0.5 };
    text.chars().count() as f32 * pt(size) * per_char
}

fn load_png(path: &Path) -> Option<Vec<u8>> {
    if !path.exists() {
        return None;
    }
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Skipping report image {}: {}", path.display(), e);
            None
        }
    }
}

fn decode_png(bytes: &[u8]) -> Option<Image> {
    let decoder = PngDecoder::new(Cursor::new(bytes)).ok()?;
    Image::try_from(decoder).ok()
}

/// Greedy word wrap on character counts. Explicit newlines are kept and
/// words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..max_chars).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

/// A write cursor over the document. `cursor` is measured in millimetres from
/// the top edge of the current page.
struct ReportPage<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    layout: Layout,
}

impl ReportPage<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = MARGIN;
        self.layout.pages += 1;
    }

    /// Breaks the page when `height` more millimetres would run into the bottom margin.
    fn reserve(&mut self, height: f32) {
        if self.cursor + height > PAGE_H - MARGIN {
            self.new_page();
        }
    }

    fn move_down(&mut self, lines: f32, size: f32) {
        self.cursor += pt(size * 1.2) * lines;
    }

    fn fill_rect(&self, x: f32, top: f32, width: f32, height: f32, color: (f32, f32, f32)) {
        self.layer.set_fill_color(rgb(color));
        let rect = Rect::new(Mm(x), Mm(PAGE_H - top - height), Mm(x + width), Mm(PAGE_H - top))
            .with_mode(PaintMode::Fill);
        self.layer.add_rect(rect);
    }

    /// Places one line of text whose baseline sits `baseline` mm below the top edge.
    fn text_at(&mut self, text: &str, size: f32, x: f32, baseline: f32, bold: bool, color: (f32, f32, f32)) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(rgb(color));
        self.layer.use_text(text, size, Mm(x), Mm(PAGE_H - baseline), font);
        self.layout.lines.push(PlacedText {
            page: self.layout.pages,
            text: text.to_string(),
        });
    }

    fn centered_at(&mut self, text: &str, size: f32, baseline: f32, bold: bool, color: (f32, f32, f32)) {
        let x = ((PAGE_W - estimated_width(text, size, bold)) / 2.0).max(MARGIN);
        self.text_at(text, size, x, baseline, bold, color);
    }

    fn line(&mut self, text: &str, size: f32, x: f32, bold: bool, color: (f32, f32, f32)) {
        let height = pt(size * 1.2);
        self.reserve(height);
        self.text_at(text, size, x, self.cursor + pt(size), bold, color);
        self.cursor += height;
    }

    fn centered_line(&mut self, text: &str, size: f32, bold: bool, color: (f32, f32, f32)) {
        let height = pt(size * 1.2);
        self.reserve(height);
        self.centered_at(text, size, self.cursor + pt(size), bold, color);
        self.cursor += height;
    }

    fn paragraph(&mut self, text: &str, size: f32, x: f32, width: f32, bold: bool, color: (f32, f32, f32)) {
        let per_char = estimated_width("n", size, bold);
        let max_chars = (width / per_char).floor() as usize;
        for line in wrap_text(text, max_chars) {
            self.line(&line, size, x, bold, color);
        }
    }

    /// Section title in brand colour with an underline rule.
    fn heading(&mut self, title: &str) {
        self.reserve(pt(16.0 * 1.2) * 3.0);
        self.line(title, 16.0, SECTION_X, false, BRAND);
        let width = estimated_width(title, 16.0, false);
        self.fill_rect(SECTION_X, self.cursor - 0.8, width, 0.35, BRAND);
        self.move_down(0.5, 16.0);
    }

    /// Draws a PNG at a fixed position; `top` is measured from the top edge.
    fn image_at(&self, bytes: &[u8], x: f32, top: f32, width: f32) {
        let Some(image) = decode_png(bytes) else {
            warn!("Skipping report image that is not a readable PNG");
            return;
        };
        let (dpi, height) = fit_width(&image, width);
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(PAGE_H - top - height)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
    }

    /// Draws a PNG centred at the cursor and advances past it.
    fn image_flow(&mut self, bytes: &[u8], width: f32) {
        let Some(image) = decode_png(bytes) else {
            warn!("Skipping report chart that is not a readable PNG");
            return;
        };
        let (_, height) = fit_width(&image, width);
        self.reserve(height);
        self.image_at(bytes, (PAGE_W - width) / 2.0, self.cursor, width);
        self.cursor += height;
    }
}

/// DPI that makes the image exactly `width` mm wide, and the resulting height.
fn fit_width(image: &Image, width: f32) -> (f32, f32) {
    let px_w = image.image.width.0.max(1) as f32;
    let px_h = image.image.height.0 as f32;
    let dpi = px_w * 25.4 / width;
    (dpi, px_h * 25.4 / dpi)
}
