// src/report/document.rs

//! Text-only report layout: A4 pages, the two standard Helvetica faces, top-down flowing
//! lines with word wrap. Serialization is done by `pdf-writer`.

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LINE_FACTOR: f32 = 1.35;

const REGULAR: Name<'static> = Name(b"F1");
const BOLD: Name<'static> = Name(b"F2");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> Name<'static> {
        match self {
            Font::Regular => REGULAR,
            Font::Bold => BOLD,
        }
    }
}

#[derive(Debug)]
struct Line {
    font: Font,
    size: f32,
    x: f32,
    y: f32,
    text: String,
}

#[derive(Debug)]
pub struct ReportDocument {
    title: String,
    pages: Vec<Vec<Line>>,
    cursor_y: f32,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: vec![Vec::new()],
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Write `text` at the left margin plus `indent`, wrapping on word boundaries.
    pub fn text(&mut self, font: Font, size: f32, indent: f32, text: &str) {
        // Helvetica averages roughly half an em per glyph.
        let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = ((usable / (size * 0.5)) as usize).max(10);
        for chunk in wrap(text, max_chars) {
            self.line(font, size, MARGIN + indent, chunk);
        }
    }

    pub fn gap(&mut self, points: f32) {
        self.cursor_y -= points;
    }

    fn line(&mut self, font: Font, size: f32, x: f32, text: String) {
        let advance = size * LINE_FACTOR;
        if self.cursor_y - advance < MARGIN {
            self.pages.push(Vec::new());
            self.cursor_y = PAGE_HEIGHT - MARGIN;
        }
        self.cursor_y -= advance;
        let y = self.cursor_y;
        if let Some(page) = self.pages.last_mut() {
            page.push(Line { font, size, x, y, text });
        }
    }

    pub fn finish(self) -> Vec<u8> {
        let catalog_id = Ref::new(1);
        let tree_id = Ref::new(2);
        let regular_id = Ref::new(3);
        let bold_id = Ref::new(4);
        let info_id = Ref::new(5);
        // then one (page, content) pair per page
        let page_ids: Vec<Ref> = (0..self.pages.len())
            .map(|i| Ref::new(6 + 2 * i as i32))
            .collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);
        pdf.type1_font(regular_id)
            .base_font(Name(b"Helvetica"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(bold_id)
            .base_font(Name(b"Helvetica-Bold"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.document_info(info_id)
            .title(TextStr(&self.title))
            .producer(TextStr("surgical-logbook"));

        for (lines, page_id) in self.pages.iter().zip(page_ids.iter().copied()) {
            let content_id = Ref::new(page_id.get() + 1);

            let mut page = pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
            page.parent(tree_id);
            page.contents(content_id);
            page.resources()
                .fonts()
                .pair(REGULAR, regular_id)
                .pair(BOLD, bold_id);
            drop(page);

            let mut content = Content::new();
            for line in lines {
                let encoded = win_ansi(&line.text);
                content.begin_text();
                content.set_font(line.font.resource(), line.size);
                content.next_line(line.x, line.y);
                content.show(Str(&encoded));
                content.end_text();
            }
            pdf.stream(content_id, &content.finish());
        }

        pdf.finish()
    }
}

/// Latin-1 bytes for the WinAnsi font encoding; anything outside becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
            _ => b'?',
        })
        .collect()
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + 1;
        if !current.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn output_is_a_pdf_with_escaped_text() {
        let mut doc = ReportDocument::new("Shift report");
        doc.text(Font::Bold, 18.0, 0.0, "Heading");
        doc.text(Font::Regular, 11.0, 0.0, "body (with parens)");
        let bytes = doc.finish();

        assert!(bytes.starts_with(b"%PDF-"));
        assert!(contains(&bytes, b"/Helvetica-Bold"));
        assert!(contains(&bytes, b"/WinAnsiEncoding"));
        assert!(contains(&bytes, b"(Heading) Tj"));
        assert!(contains(&bytes, b"(body \\(with parens\\)) Tj"));
        assert!(contains(&bytes, b"%%EOF"));
    }

    #[test]
    fn long_content_spills_onto_new_pages() {
        let mut doc = ReportDocument::new("t");
        for i in 0..200 {
            doc.text(Font::Regular, 11.0, 0.0, &format!("line {i}"));
        }
        let pages = doc.page_count();
        assert!(pages > 1);
        let bytes = doc.finish();
        assert!(contains(&bytes, format!("/Count {pages}").as_bytes()));
    }

    #[test]
    fn text_outside_latin1_is_replaced() {
        assert_eq!(win_ansi("Pérez 漢"), b"P\xe9rez ?".to_vec());
    }

    #[test]
    fn wrap_breaks_on_words() {
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("", 10), vec![String::new()]);
    }
}
