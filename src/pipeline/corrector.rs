use super::document::Document;

/// Deterministic clean-up pass: whitespace runs collapse to one space and
/// every `". "`-delimited sentence starts with an upper-case letter.
#[derive(Debug, Clone, Default)]
pub struct Corrector;

impl Corrector {
    pub fn new() -> Self {
        Self
    }

    /// Corrects each section body in place. Section names are left alone.
    pub fn correct(&self, mut document: Document) -> Document {
        for section in &mut document.sections {
            section.body = correct_text(&section.body);
        }
        document
    }
}

pub fn correct_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .split(". ")
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .join(". ")
}

fn capitalize_first(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
