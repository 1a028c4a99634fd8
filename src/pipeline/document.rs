//! The one draft shape used inside the pipeline.
//!
//! Plain text enters through [`Document::from_text`], which turns each
//! blank-line separated paragraph into a section named after its first line,
//! and leaves through [`Document::to_text`].

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub name: String,
    pub body: String,
}

impl Section {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub sections: Vec<Section>,
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        let sections = split_paragraphs(text)
            .map(|paragraph| {
                let name = paragraph.lines().next().unwrap_or_default().trim();
                Section::new(name, paragraph)
            })
            .collect();
        Self {
            sections,
            metadata: Map::new(),
        }
    }

    pub fn to_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.body.as_str())
            .filter(|body| !body.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn push_section(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.sections.push(Section::new(name, body));
    }
}

/// Non-empty paragraphs separated by one or more blank lines, trimmed.
pub fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}
