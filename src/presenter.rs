use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, ErrorKind},
    path::{Path, PathBuf},
};

use crate::pipeline::document::split_paragraphs;

// US Letter
const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 25.4;

const FONT_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 4.2; // 12pt
const PARAGRAPH_SPACING: f32 = 4.2; // 12pt
/// Helvetica at 10pt averages a little under 5pt per glyph over 468pt of
/// usable width.
pub const MAX_CHARS_PER_LINE: usize = 90;

const CREATE_ATTEMPTS: usize = 5;

/// Writes contract text to paginated PDFs under one directory.
#[derive(Debug, Clone)]
pub struct Presenter {
    output_dir: PathBuf,
}

impl Presenter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Renders `text` on the blocking pool and returns the written path.
    pub async fn render(&self, text: &str) -> anyhow::Result<PathBuf> {
        let dir = self.output_dir.clone();
        let text = text.to_string();
        let path = tokio::task::spawn_blocking(move || render_blocking(&dir, &text))
            .await
            .context("PDF rendering task panicked")??;
        tracing::info!(path = %path.display(), "Contract PDF written");
        Ok(path)
    }

    /// Removes a PDF written for a contract that was never saved.
    pub async fn discard(&self, path: &Path) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), "Failed to remove orphaned PDF: {}", err);
        }
    }
}

pub fn pdf_file_name(now: DateTime<Utc>) -> String {
    format!("contract_{}.pdf", now.format("%Y%m%d%H%M%S%3f"))
}

fn render_blocking(dir: &Path, text: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
    let (path, file) = create_unique(dir)?;
    write_pdf(text, file)?;
    Ok(path)
}

/// Names are millisecond timestamps; on a clash within the same
/// millisecond wait for the next one.
fn create_unique(dir: &Path) -> anyhow::Result<(PathBuf, File)> {
    for _ in 0..CREATE_ATTEMPTS {
        let path = dir.join(pdf_file_name(Utc::now()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to create {}", path.display()))
            }
        }
    }
    Err(anyhow!("Could not pick a unique PDF file name"))
}

fn write_pdf(text: &str, file: File) -> anyhow::Result<()> {
    let (doc, page, layer) = PdfDocument::new(
        "Contract",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|err| anyhow!("Failed to load PDF font: {}", err))?;

    let top = PAGE_HEIGHT - MARGIN;
    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = top;

    for paragraph in layout(text, MAX_CHARS_PER_LINE) {
        for line in paragraph {
            if y < MARGIN {
                let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
                current = doc.get_page(page).get_layer(layer);
                y = top;
            }
            current.use_text(line, FONT_SIZE, Mm(MARGIN), Mm(y), &font);
            y -= LINE_HEIGHT;
        }
        y -= PARAGRAPH_SPACING;
    }

    doc.save(&mut BufWriter::new(file))
        .map_err(|err| anyhow!("Failed to save PDF: {}", err))
}

/// Splits text into paragraphs on blank lines and word-wraps each one.
pub fn layout(text: &str, width: usize) -> Vec<Vec<String>> {
    split_paragraphs(text).map(|p| wrap(p, width)).collect()
}

pub fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if word_len > width {
            // Hard-break words that cannot fit on any line
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                if chunk.len() == width {
                    lines.push(chunk.iter().collect());
                } else {
                    line = chunk.iter().collect();
                    line_len = chunk.len();
                }
            }
            continue;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += word_len;
    }
    if line_len > 0 {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_has_millisecond_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 11, 26, 9, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(pdf_file_name(at), "contract_20241126090507042.pdf");
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps over", "the lazy", "dog"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn breaks_overlong_words() {
        let lines = wrap("ab abcdefghij xy", 4);
        assert_eq!(lines, vec!["ab", "abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn layout_keeps_paragraphs() {
        let paragraphs = layout("First para\nstill first\n\n\nSecond", 80);
        assert_eq!(
            paragraphs,
            vec![vec!["First para still first".to_string()], vec!["Second".to_string()]]
        );
        assert!(layout("   ", 80).is_empty());
    }

    #[tokio::test]
    async fn renders_multi_page_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let presenter = Presenter::new(dir.path().join("out"));
        let text = (1..=120)
            .map(|i| format!("{i}. SECTION\nClause text for section {i} that is long enough to wrap onto a second line of the page."))
            .collect::<Vec<_>>()
            .join("\n\n");

        let path = presenter.render(&text).await.unwrap();
        assert!(path.starts_with(dir.path().join("out")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("contract_") && name.ends_with(".pdf"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        presenter.discard(&path).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_renders_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let presenter = Presenter::new(dir.path());
        let (a, b) = tokio::join!(presenter.render("A"), presenter.render("B"));
        assert_ne!(a.unwrap(), b.unwrap());
    }
}
