//! Contract generation workflow.
//!
//! Five stages run in a fixed order against a request-scoped
//! [`PipelineState`]. Each stage records its own failure on the state and the
//! controller stops at the first recorded error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod corrector;
pub mod document;
pub mod drafter;
pub mod jurisdiction;
pub mod references;
pub mod retriever;

use crate::types::ContractType;
use corrector::Corrector;
use document::Document;
use drafter::{DraftError, Drafter, STANDARD_INSTRUCTIONS};
use jurisdiction::JurisdictionCustomizer;
use references::ScoredReference;
use retriever::Retriever;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRequest {
    pub contract_type: ContractType,
    pub party1: String,
    pub party2: String,
    pub jurisdiction: String,
    #[serde(default)]
    pub additional_jurisdictions: Vec<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub statutory_compliance: Map<String, Value>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

impl ContractRequest {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("party1", &self.party1),
            ("party2", &self.party2),
            ("jurisdiction", &self.jurisdiction),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Renders a JSON detail value for prompts: strings without quotes, arrays
/// comma separated.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "not specified".to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

pub fn detail_or(details: &Map<String, Value>, key: &str) -> String {
    details
        .get(key)
        .map_or_else(|| "not specified".to_string(), display_value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectInputs,
    RetrieveReferences,
    GenerateDraft,
    CorrectDraft,
    CustomizeJurisdiction,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::CollectInputs,
        Stage::RetrieveReferences,
        Stage::GenerateDraft,
        Stage::CorrectDraft,
        Stage::CustomizeJurisdiction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::CollectInputs => "collect_inputs",
            Stage::RetrieveReferences => "retrieve_references",
            Stage::GenerateDraft => "generate_draft",
            Stage::CorrectDraft => "correct_draft",
            Stage::CustomizeJurisdiction => "customize_jurisdiction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    Validation,
    Configuration,
    External,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} failed: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    fn new(stage: Stage, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct PipelineState {
    pub request: ContractRequest,
    pub instructions: Option<String>,
    pub references: Vec<ScoredReference>,
    pub draft: Option<Document>,
    pub corrected: Option<Document>,
    pub final_document: Option<Document>,
    /// Stages that finished without recording an error, in run order.
    pub completed: Vec<Stage>,
    pub error: Option<StageError>,
}

impl PipelineState {
    pub fn new(request: ContractRequest) -> Self {
        Self {
            request,
            instructions: None,
            references: Vec::new(),
            draft: None,
            corrected: None,
            final_document: None,
            completed: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, stage: Stage, kind: StageErrorKind, message: impl Into<String>) {
        self.error = Some(StageError::new(stage, kind, message));
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedContract {
    pub contract_type: ContractType,
    pub text: String,
    pub document: Document,
    pub references: Vec<ScoredReference>,
}

pub struct Workflow {
    retriever: Retriever,
    drafter: Drafter,
    corrector: Corrector,
    customizer: JurisdictionCustomizer,
}

impl Workflow {
    pub fn new(retriever: Retriever, drafter: Drafter) -> Self {
        Self {
            retriever,
            drafter,
            corrector: Corrector::new(),
            customizer: JurisdictionCustomizer::new(),
        }
    }

    pub async fn run(&self, request: ContractRequest) -> Result<GeneratedContract, StageError> {
        let state = self.execute(request).await;
        if let Some(err) = state.error {
            return Err(err);
        }
        let document = state.final_document.ok_or_else(|| {
            StageError::new(
                Stage::CustomizeJurisdiction,
                StageErrorKind::Configuration,
                "Pipeline finished without a document",
            )
        })?;
        Ok(GeneratedContract {
            contract_type: state.request.contract_type,
            text: document.to_text(),
            document,
            references: state.references,
        })
    }

    /// Runs the stages in order and returns the terminal state.
    pub async fn execute(&self, request: ContractRequest) -> PipelineState {
        let mut state = PipelineState::new(request);
        for stage in Stage::ORDER {
            tracing::debug!(%stage, "Running pipeline stage");
            self.run_stage(stage, &mut state).await;
            if should_halt(&state) {
                tracing::warn!(%stage, "Pipeline halted");
                break;
            }
            state.completed.push(stage);
        }
        state
    }

    async fn run_stage(&self, stage: Stage, state: &mut PipelineState) {
        match stage {
            Stage::CollectInputs => {
                if let Err(message) = state.request.validate() {
                    state.fail(stage, StageErrorKind::Validation, message);
                    return;
                }
                state.instructions = Some(STANDARD_INSTRUCTIONS.to_string());
            }
            Stage::RetrieveReferences => {
                let found = self.retriever.search(&state.request).await;
                match found {
                    Ok(references) => state.references = references,
                    Err(err) => state.fail(stage, StageErrorKind::External, format!("{err:#}")),
                }
            }
            Stage::GenerateDraft => {
                let instructions = state.instructions.as_deref().unwrap_or(STANDARD_INSTRUCTIONS);
                let drafted = self
                    .drafter
                    .create_draft(&state.request, instructions, &state.references)
                    .await;
                match drafted {
                    Ok(draft) => state.draft = Some(Document::from_text(&draft.text)),
                    Err(err @ DraftError::MissingTemplate(_)) => {
                        state.fail(stage, StageErrorKind::Configuration, err.to_string())
                    }
                    Err(err @ DraftError::Generation(_)) => {
                        state.fail(stage, StageErrorKind::External, err.to_string())
                    }
                }
            }
            Stage::CorrectDraft => match state.draft.clone() {
                Some(draft) => state.corrected = Some(self.corrector.correct(draft)),
                None => state.fail(stage, StageErrorKind::Configuration, "No draft to correct"),
            },
            Stage::CustomizeJurisdiction => match state.corrected.clone() {
                Some(corrected) => {
                    state.final_document = Some(self.customizer.customize(
                        corrected,
                        &state.request.jurisdiction,
                        &state.request.additional_jurisdictions,
                    ))
                }
                None => state.fail(
                    stage,
                    StageErrorKind::Configuration,
                    "No corrected draft to customize",
                ),
            },
        }
    }
}

fn should_halt(state: &PipelineState) -> bool {
    state.error.is_some()
}
