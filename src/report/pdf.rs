//! Minimal PDF writer for reports.
//!
//! Produces a PDF 1.4 document of plain text pages set in Helvetica.
//! Every section is followed by a page break, including the last, so a
//! report whose sections each fit on one page has `sections + 1` pages
//! and ends on a blank one.

use super::{flatten_data, Report};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BODY_HEIGHT: f32 = PAGE_HEIGHT - 2.0 * MARGIN;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 10.0;
const DATA_SIZE: f32 = 9.0;

#[derive(Debug, Clone, PartialEq)]
struct Line {
    size: f32,
    text: String,
}

fn leading(size: f32) -> f32 {
    size * 1.4
}

/// Approximate characters per line for Helvetica at `size`.
fn wrap_width(size: f32) -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.5)) as usize
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct Layout {
    pages: Vec<Vec<Line>>,
    used: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            used: 0.0,
        }
    }

    fn push(&mut self, size: f32, text: impl Into<String>) {
        let step = leading(size);
        if self.used + step > BODY_HEIGHT {
            self.page_break();
        }
        if let Some(page) = self.pages.last_mut() {
            page.push(Line {
                size,
                text: text.into(),
            });
        }
        self.used += step;
    }

    fn push_wrapped(&mut self, size: f32, text: &str) {
        for line in wrap(text, wrap_width(size)) {
            self.push(size, line);
        }
    }

    fn gap(&mut self) {
        self.push(BODY_SIZE, "");
    }

    fn page_break(&mut self) {
        self.pages.push(Vec::new());
        self.used = 0.0;
    }
}

fn layout(report: &Report) -> Vec<Vec<Line>> {
    let mut doc = Layout::new();

    doc.push_wrapped(TITLE_SIZE, &report.title);
    doc.push(BODY_SIZE, format!("Template: {}", report.template));
    doc.push(
        BODY_SIZE,
        format!(
            "Framework: {}",
            report
                .framework
                .map(|f| f.to_string())
                .unwrap_or_else(|| "All".to_string())
        ),
    );
    doc.push(
        BODY_SIZE,
        format!(
            "Period: {} to {}",
            report.period.start.format("%Y-%m-%d"),
            report.period.end.format("%Y-%m-%d")
        ),
    );
    doc.push(
        BODY_SIZE,
        format!(
            "Generated: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    );
    doc.gap();

    for section in &report.sections {
        doc.push_wrapped(HEADING_SIZE, &section.title);
        doc.push_wrapped(BODY_SIZE, &section.content);
        let rows = flatten_data(&section.data);
        if !rows.is_empty() {
            doc.gap();
            for (key, value) in rows {
                doc.push_wrapped(DATA_SIZE, &format!("{}: {}", key, value));
            }
        }
        doc.page_break();
    }

    doc.pages
}

/// Escape text for a PDF literal string. Characters outside printable
/// ASCII are replaced with `?`.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn content_stream(lines: &[Line]) -> String {
    let mut stream = String::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        y -= leading(line.size);
        if line.text.is_empty() {
            continue;
        }
        stream.push_str(&format!(
            "BT\n/F1 {} Tf\n1 0 0 1 {} {:.1} Tm\n({}) Tj\nET\n",
            line.size,
            MARGIN,
            y,
            escape(&line.text)
        ));
    }
    stream
}

/// Render `report` as PDF bytes.
pub fn render(report: &Report) -> Vec<u8> {
    let pages = layout(report);
    let mut objects: Vec<String> = Vec::new();

    // 1: catalog, 2: page tree, 3: font, then a (page, contents) pair per page.
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    for (i, lines) in pages.iter().enumerate() {
        let contents_id = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT, contents_id
        ));
        let stream = content_stream(lines);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));

    out.into_bytes()
}
