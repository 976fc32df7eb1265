use lopdf::content::Content;
use lopdf::Document;

use crate::error::SourceError;
use crate::layout::{group_spans_into_lines, layout_from_text, looks_unreadable, spans_from_operations};
use crate::types::PageLayout;

/// Turns PDF bytes into positioned text, one layout per page in page order.
pub trait PageSource: Send + Sync {
    fn pages(&self, pdf: &[u8]) -> Result<Vec<PageLayout>, SourceError>;
}

// ── lopdf ──────────────────────────────────────────────────────────────────

/// Reads each page's content stream with lopdf. Pages whose decoded text
/// is unreadable fall back to lopdf's own text extraction, which honours
/// ToUnicode maps but loses positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfSource;

impl PageSource for LopdfSource {
    fn pages(&self, pdf: &[u8]) -> Result<Vec<PageLayout>, SourceError> {
        let doc = Document::load_mem(pdf).map_err(|e| SourceError::Parse(e.to_string()))?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(SourceError::NoPages);
        }

        let mut layouts = Vec::with_capacity(pages.len());
        for (&number, &page_id) in &pages {
            let spans = match doc.get_page_content(page_id).and_then(|c| Content::decode(&c)) {
                Ok(content) => spans_from_operations(&content.operations),
                Err(e) => {
                    tracing::warn!(page = number, error = %e, "page content not decodable");
                    Vec::new()
                }
            };

            let layout = if spans.is_empty() || looks_unreadable(&spans) {
                match doc.extract_text(&[number]) {
                    Ok(text) if !text.trim().is_empty() => {
                        tracing::debug!(page = number, "using lopdf text extraction for page");
                        layout_from_text(number as usize, &text)
                    }
                    _ => PageLayout { number: number as usize, lines: Vec::new() },
                }
            } else {
                PageLayout {
                    number: number as usize,
                    lines: group_spans_into_lines(spans),
                }
            };
            layouts.push(layout);
        }
        Ok(layouts)
    }
}

// ── Mock source (tests and callers that already hold text) ─────────────────

/// Serves fixed pages regardless of the input bytes.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    pub pages: Vec<PageLayout>,
}

impl MockSource {
    pub fn new(pages: Vec<PageLayout>) -> Self {
        Self { pages }
    }

    /// One page per string; columns are separated by two or more spaces.
    pub fn from_text<S: AsRef<str>>(pages: &[S]) -> Self {
        let pages = pages
            .iter()
            .enumerate()
            .map(|(i, text)| layout_from_text(i + 1, text.as_ref()))
            .collect();
        Self { pages }
    }
}

impl PageSource for MockSource {
    fn pages(&self, _pdf: &[u8]) -> Result<Vec<PageLayout>, SourceError> {
        if self.pages.is_empty() {
            return Err(SourceError::NoPages);
        }
        Ok(self.pages.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lopdf_source_reads_positioned_cells() {
        let pdf = testpdf::build(&[vec![(50, 700, "A100"), (120, 700, "Olio 1L"), (400, 700, "5,00"), (50, 686, "B200")]]);
        let pages = LopdfSource.pages(&pdf).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].lines.len(), 2);
        let cells: Vec<&str> = pages[0].lines[0].cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(cells, vec!["A100", "Olio 1L", "5,00"]);
        assert_eq!(pages[0].lines[0].cells[2].x, 400.0);
    }

    #[test]
    fn lopdf_source_keeps_page_order_and_empty_pages() {
        let pdf = testpdf::build(&[vec![], vec![(50, 700, "Pagina 2")]]);
        let pages = LopdfSource.pages(&pdf).unwrap();
        assert_eq!(pages.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 2]);
        assert!(pages[0].lines.is_empty());
        assert_eq!(pages[1].text(), "Pagina 2");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(LopdfSource.pages(b"not a pdf"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn mock_ignores_input_bytes() {
        let source = MockSource::from_text(&["Fattura n. 12"]);
        assert_eq!(source.pages(b"anything").unwrap()[0].text(), "Fattura n. 12");
        assert_eq!(source.pages(b"").unwrap().len(), 1);
    }
}
