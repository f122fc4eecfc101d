use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use rb_core::{Error, Result};

/// A4 in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;
/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

fn report_err(e: lopdf::Error) -> Error {
    Error::Report(e.to_string())
}

/// Map text onto WinAnsi bytes, substituting what the base fonts cannot show.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .flat_map(|c| -> Vec<u8> {
            match c {
                '\u{2018}' | '\u{2019}' => vec![b'\''],
                '\u{201C}' | '\u{201D}' => vec![b'"'],
                '\u{2013}' | '\u{2014}' => vec![b'-'],
                '\u{2022}' => vec![0x95],
                '\u{2026}' => b"...".to_vec(),
                '\t' | '\n' | '\r' => vec![b' '],
                c if (' '..='~').contains(&c) => vec![c as u8],
                c if ('\u{A0}'..='\u{FF}').contains(&c) => vec![c as u32 as u8],
                _ => vec![b'?'],
            }
        })
        .collect()
}

/// Greedy word wrap to at most `width` characters per line. Words longer
/// than a line are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > width && current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Lays text out top to bottom, starting a new page when the current one is full.
pub struct PdfWriter {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(!self.current.is_empty())
    }

    pub fn new_page(&mut self) {
        if !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    pub fn space(&mut self, height: f32) {
        self.y -= height;
        if self.y < MARGIN {
            self.new_page();
        }
    }

    fn line_at(&mut self, text: &str, font: Font, size: f32, x: f32) {
        let leading = size * 1.4;
        self.ensure_room(leading);
        self.y -= leading;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![x.into(), self.y.into()]),
            Operation::new("Tj", vec![Object::String(encode_text(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Write `text` wrapped to the page width, indented by `indent` points.
    pub fn paragraph(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let chars = (usable / (size * GLYPH_WIDTH)) as usize;
        for line in wrap(text, chars) {
            self.line_at(&line, font, size, MARGIN + indent);
        }
    }

    pub fn heading(&mut self, text: &str, size: f32) {
        // keep a heading on the same page as at least a couple of body lines
        self.ensure_room(size * 1.4 + 40.0);
        self.paragraph(text, Font::Bold, size, 0.0);
        self.space(size * 0.4);
    }

    pub fn bullets(&mut self, items: &[String], size: f32) {
        for item in items {
            self.paragraph(&format!("\u{2022} {}", item), Font::Regular, size, 12.0);
        }
    }

    pub fn centered(&mut self, text: &str, font: Font, size: f32) {
        let usable = PAGE_WIDTH - 2.0 * MARGIN;
        let chars = (usable / (size * GLYPH_WIDTH)) as usize;
        for line in wrap(text, chars) {
            let width = line.chars().count() as f32 * size * GLYPH_WIDTH;
            let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
            self.line_at(&line, font, size, x);
        }
    }

    /// Assemble the pages into a PDF document.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.new_page();
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for operations in self.pages {
            let content = Content { operations };
            let content_id: ObjectId =
                doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(report_err)?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_WIDTH),
                    Object::Real(PAGE_HEIGHT),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| Error::Report(e.to_string()))?;
        Ok(bytes)
    }
}
