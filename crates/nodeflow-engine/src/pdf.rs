//! Minimal PDF writer for plain text.
//!
//! Produces an A4 document in Helvetica with greedy word wrapping and as
//! many pages as the text needs. Characters outside Latin-1 are replaced
//! with `?` since the standard fonts cannot show them.

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
/// 10 mm.
const MARGIN: f32 = 28.35;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 14.0;
/// Rough Helvetica advance per character, in em.
const AVG_CHAR_WIDTH: f32 = 0.5;

fn chars_per_line() -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (FONT_SIZE * AVG_CHAR_WIDTH)) as usize
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize
}

/// Wrap `text` into lines of at most `width` characters. Explicit newlines
/// are kept; overlong words are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut line = String::new();
        let mut line_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if line_len == 0 { word.len() } else { word.len() + 1 };
            if line_len + needed > width {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        lines.push(line);
    }
    lines
}

/// Escape a line for a PDF literal string, encoded as Latin-1.
fn escape(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 2);
    for c in line.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            '\t' => out.push(b' '),
            c if (c as u32) < 0x20 => {}
            c if (c as u32) <= 0xFF => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn page_stream(lines: &[String]) -> Vec<u8> {
    let mut stream = Vec::new();
    stream.extend_from_slice(
        format!(
            "BT\n/F1 {} Tf\n{} TL\n{:.2} {:.2} Td\n",
            FONT_SIZE,
            LEADING,
            MARGIN,
            PAGE_HEIGHT - MARGIN - FONT_SIZE
        )
        .as_bytes(),
    );
    for line in lines {
        stream.push(b'(');
        stream.extend_from_slice(&escape(line));
        stream.extend_from_slice(b") Tj T*\n");
    }
    stream.extend_from_slice(b"ET");
    stream
}

/// Render `text` as a PDF document.
pub fn render_text(text: &str) -> Vec<u8> {
    let lines = wrap(text, chars_per_line());
    let pages: Vec<&[String]> = lines.chunks(lines_per_page().max(1)).collect();
    let page_count = pages.len();

    // 1: catalog, 2: page tree, 3: font, then a (page, contents) pair per page.
    let page_obj = |i: usize| 4 + 2 * i;
    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(3 + 2 * page_count);

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count).into_bytes());
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_vec(),
    );

    for (i, page) in pages.iter().enumerate() {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH,
                PAGE_HEIGHT,
                page_obj(i) + 1
            )
            .into_bytes(),
        );
        let stream = page_stream(page);
        let mut contents = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        contents.extend_from_slice(&stream);
        contents.extend_from_slice(b"\nendstream");
        objects.push(contents);
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}
