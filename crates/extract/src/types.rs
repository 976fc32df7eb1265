use chrono::NaiveDate;
use fatture_core::RawLine;
use serde::{Deserialize, Serialize};

/// A single extracted value with an associated confidence score (0.0–1.0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedField<T> {
    pub value: T,
    /// Confidence in this extraction (0.0 = guessed, 1.0 = certain).
    pub confidence: f32,
}

impl<T> ExtractedField<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence: confidence.clamp(0.0, 1.0) }
    }
}

/// A run of text at a position on the page, in PDF user space (origin
/// bottom-left, Y grows upwards).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

impl TextSpan {
    pub fn end(&self) -> f32 {
        self.x + self.width
    }

    pub fn center(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

/// Spans sharing a baseline, merged into cells and sorted left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub y: f32,
    pub font_size: f32,
    pub cells: Vec<TextSpan>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.cells.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

/// One page as lines, top of page first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    /// 1-based page number.
    pub number: usize,
    pub lines: Vec<TextLine>,
}

impl PageLayout {
    pub fn text(&self) -> String {
        self.lines.iter().map(TextLine::text).collect::<Vec<_>>().join("\n")
    }
}

/// Everything read from one invoice PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    /// File name or label the bytes came from.
    pub document: String,
    /// SHA-256 hex digest of the PDF bytes.
    pub digest: String,
    pub number: Option<ExtractedField<String>>,
    pub date: Option<ExtractedField<NaiveDate>>,
    pub page_count: usize,
    /// Pages that yielded no rows.
    pub empty_pages: Vec<usize>,
    pub lines: Vec<RawLine>,
}

impl ExtractedInvoice {
    pub fn flagged_rows(&self) -> usize {
        self.lines.iter().filter(|l| l.is_flagged()).count()
    }
}
