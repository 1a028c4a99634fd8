use serde_json::json;

use super::document::Document;

pub const GOVERNING_LAW_SECTION: &str = "Governing Law";
pub const COMPLIANCE_SECTION: &str = "Regulatory Compliance";
pub const MULTI_JURISDICTION_SECTION: &str = "Multi-jurisdictional Application";

#[derive(Debug, Clone, Default)]
pub struct JurisdictionCustomizer;

impl JurisdictionCustomizer {
    pub fn new() -> Self {
        Self
    }

    /// Appends the governing-law, compliance and (when `additional` has
    /// entries) multi-jurisdiction clauses, and records the jurisdiction set
    /// in the document metadata.
    pub fn customize(&self, mut document: Document, primary: &str, additional: &[String]) -> Document {
        let primary = primary.trim();
        let additional: Vec<&str> = additional
            .iter()
            .map(|j| j.trim())
            .filter(|j| !j.is_empty())
            .collect();

        document.push_section(
            GOVERNING_LAW_SECTION,
            format!("Governing Law: This contract shall be governed by the laws of {primary}."),
        );

        let compliance_statement =
            format!("This contract complies with the regulations of {primary}.");
        document.push_section(COMPLIANCE_SECTION, compliance_statement.clone());

        if !additional.is_empty() {
            document.push_section(
                MULTI_JURISDICTION_SECTION,
                format!(
                    "Multi-jurisdictional Application: While this contract is primarily governed by the laws of {primary}, it also considers the relevant regulations of the following jurisdictions: {}.",
                    additional.join(", ")
                ),
            );
        }

        document
            .metadata
            .insert("compliance_statement".into(), json!(compliance_statement));
        document.metadata.insert(
            "jurisdictions".into(),
            json!({ "primary": primary, "additional": additional }),
        );
        document
    }

    pub fn customize_text(&self, text: &str, primary: &str, additional: &[String]) -> String {
        self.customize(Document::from_text(text), primary, additional)
            .to_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_jurisdiction_has_no_multi_clause() {
        let out = JurisdictionCustomizer::new().customize_text("Body.", "Delaware", &[]);
        insta::assert_snapshot!(out, @r###"
        Body.

        Governing Law: This contract shall be governed by the laws of Delaware.

        This contract complies with the regulations of Delaware.
        "###);
        assert!(!out.contains("Multi-jurisdictional"));
    }

    #[test]
    fn additional_jurisdictions_are_listed() {
        let out = JurisdictionCustomizer::new().customize_text(
            "Body.",
            "Delaware",
            &["California".to_string(), " ".to_string(), "Texas".to_string()],
        );
        assert!(out.contains("governed by the laws of Delaware."));
        assert!(out.ends_with(
            "it also considers the relevant regulations of the following jurisdictions: California, Texas."
        ));
    }

    #[test]
    fn clauses_are_appended_in_order_with_metadata() {
        let doc = JurisdictionCustomizer::new().customize(
            Document::from_text("Body."),
            "Delaware",
            &["California".to_string()],
        );
        let names: Vec<_> = doc.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Body.",
                GOVERNING_LAW_SECTION,
                COMPLIANCE_SECTION,
                MULTI_JURISDICTION_SECTION
            ]
        );
        assert_eq!(
            doc.metadata["jurisdictions"],
            json!({ "primary": "Delaware", "additional": ["California"] })
        );
        assert_eq!(
            doc.metadata["compliance_statement"],
            json!("This contract complies with the regulations of Delaware.")
        );
    }
}
