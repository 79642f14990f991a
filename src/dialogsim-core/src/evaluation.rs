//! Best-effort quality evaluation.
//!
//! Utterances can be scored by an external evaluation service for tone,
//! coherence and resolution. Every failure here is soft: outcomes are
//! reported to the observability stream and never reach the conversation
//! state.

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DialogueError;

/// Evaluation templates understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalTemplate {
    Tone,
    Coherence,
    Resolution,
}

impl EvalTemplate {
    /// Template name on the wire.
    pub fn template_name(&self) -> &'static str {
        match self {
            EvalTemplate::Tone => "tone",
            EvalTemplate::Coherence => "conversation_coherence",
            EvalTemplate::Resolution => "conversation_resolution",
        }
    }

    /// Conversation-level templates read the subject from `output`; the rest
    /// read it from `input`.
    pub fn subject_field(&self) -> SubjectField {
        match self {
            EvalTemplate::Coherence | EvalTemplate::Resolution => SubjectField::Output,
            EvalTemplate::Tone => SubjectField::Input,
        }
    }

    /// Templates to run for an utterance. Coherence and resolution need a
    /// prior turn, so the opening utterance only gets a tone check.
    pub fn for_utterance(is_first: bool) -> &'static [EvalTemplate] {
        if is_first {
            &[EvalTemplate::Tone]
        } else {
            &[
                EvalTemplate::Tone,
                EvalTemplate::Coherence,
                EvalTemplate::Resolution,
            ]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectField {
    Input,
    Output,
}

impl SubjectField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectField::Input => "input",
            SubjectField::Output => "output",
        }
    }
}

/// One scored result returned by the evaluator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalRecord {
    pub output: serde_json::Value,
    #[serde(default)]
    pub reason: Option<String>,
}

impl EvalRecord {
    /// The verdict as display text.
    pub fn label(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Capability: score a piece of text with a template on a given model.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        template: EvalTemplate,
        field: SubjectField,
        text: &str,
        model: &str,
    ) -> Result<Vec<EvalRecord>, DialogueError>;
}

/// Result of evaluating one template.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Scored {
        template: EvalTemplate,
        label: String,
        rationale: String,
        model: String,
    },
    Unavailable {
        template: EvalTemplate,
        reason: String,
    },
}

impl EvaluationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationOutcome::Scored { .. })
    }

    pub fn template(&self) -> EvalTemplate {
        match self {
            EvaluationOutcome::Scored { template, .. }
            | EvaluationOutcome::Unavailable { template, .. } => *template,
        }
    }
}

/// Evaluator service credentials.
#[derive(Debug, Clone)]
pub struct EvaluatorCredentials {
    pub api_key: String,
    pub secret_key: String,
}

impl EvaluatorCredentials {
    /// Both values must be present and non-empty.
    pub fn from_parts(api_key: Option<String>, secret_key: Option<String>) -> Option<Self> {
        match (api_key, secret_key) {
            (Some(api_key), Some(secret_key)) if !api_key.is_empty() && !secret_key.is_empty() => {
                Some(Self { api_key, secret_key })
            }
            _ => None,
        }
    }
}

/// Evaluator speaking the evaluation service's JSON API.
pub struct HttpEvaluator {
    http: reqwest::Client,
    endpoint: String,
    credentials: EvaluatorCredentials,
}

#[derive(Deserialize)]
struct EvalResponse {
    #[serde(default)]
    eval_results: Vec<EvalRecord>,
}

impl HttpEvaluator {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: EvaluatorCredentials,
        timeout: Duration,
    ) -> Result<Self, DialogueError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DialogueError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            credentials,
        })
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(
        &self,
        template: EvalTemplate,
        field: SubjectField,
        text: &str,
        model: &str,
    ) -> Result<Vec<EvalRecord>, DialogueError> {
        let body = request_body(template, field, text, model);

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Api-Key", &self.credentials.api_key)
            .header("X-Secret-Key", &self.credentials.secret_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DialogueError::EvaluationError(e.to_string()))?;

        let parsed: EvalResponse = response
            .json()
            .await
            .map_err(|e| DialogueError::EvaluationError(e.to_string()))?;

        Ok(parsed.eval_results)
    }
}

/// JSON body for one evaluation call. The subject text is keyed by `field`.
pub fn request_body(
    template: EvalTemplate,
    field: SubjectField,
    text: &str,
    model: &str,
) -> serde_json::Value {
    let mut inputs = serde_json::Map::new();
    inputs.insert(field.as_str().to_string(), text.into());

    serde_json::json!({
        "eval_templates": template.template_name(),
        "inputs": inputs,
        "model_name": model,
    })
}

/// Runs templates against model candidates and folds every failure into an
/// [`EvaluationOutcome::Unavailable`].
pub struct QualityEvaluator {
    evaluator: Option<Arc<dyn Evaluator>>,
    models: Vec<String>,
    timeout: Duration,
}

impl QualityEvaluator {
    pub fn new(evaluator: Arc<dyn Evaluator>, models: Vec<String>, timeout: Duration) -> Self {
        Self {
            evaluator: Some(evaluator),
            models,
            timeout,
        }
    }

    /// An evaluator with no backing service; every template is unavailable.
    pub fn disabled() -> Self {
        Self {
            evaluator: None,
            models: Vec::new(),
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.evaluator.is_some()
    }

    /// Evaluate every template that applies to this utterance.
    pub async fn evaluate_utterance(&self, text: &str, is_first: bool) -> Vec<EvaluationOutcome> {
        let mut outcomes = Vec::new();
        for &template in EvalTemplate::for_utterance(is_first) {
            outcomes.push(self.evaluate(template, text).await);
        }
        outcomes
    }

    /// Try each model candidate in order until one returns a result.
    pub async fn evaluate(&self, template: EvalTemplate, text: &str) -> EvaluationOutcome {
        let Some(evaluator) = self.evaluator.as_ref() else {
            return EvaluationOutcome::Unavailable {
                template,
                reason: "evaluator credentials not configured".to_string(),
            };
        };

        let field = template.subject_field();

        for model in &self.models {
            let attempt = tokio::time::timeout(
                self.timeout,
                evaluator.evaluate(template, field, text, model),
            )
            .await;

            match attempt {
                Ok(Ok(records)) => match records.into_iter().next() {
                    Some(record) => {
                        info!(
                            "Evaluation '{}' succeeded with {}",
                            template.template_name(),
                            model
                        );
                        return EvaluationOutcome::Scored {
                            template,
                            label: record.label(),
                            rationale: record.reason.unwrap_or_default(),
                            model: model.clone(),
                        };
                    }
                    None => warn!("No evaluation results from {}", model),
                },
                Ok(Err(e)) => warn!("Evaluator model {} failed: {}", model, e),
                Err(_) => warn!(
                    "Evaluator model {} timed out after {}s",
                    model,
                    self.timeout.as_secs()
                ),
            }
        }

        EvaluationOutcome::Unavailable {
            template,
            reason: "all model attempts failed".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; answers from a queue, then returns an error.
    #[derive(Default)]
    pub(crate) struct ScriptedEvaluator {
        pub(crate) replies: Mutex<Vec<Result<Vec<EvalRecord>, String>>>,
        pub(crate) calls: Mutex<Vec<(EvalTemplate, SubjectField, String)>>,
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn evaluate(
            &self,
            template: EvalTemplate,
            field: SubjectField,
            _text: &str,
            model: &str,
        ) -> Result<Vec<EvalRecord>, DialogueError> {
            self.calls
                .lock()
                .unwrap()
                .push((template, field, model.to_string()));
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(DialogueError::EvaluationError("no scripted reply".to_string()));
            }
            replies.remove(0).map_err(DialogueError::EvaluationError)
        }
    }

    /// Fails every call.
    pub(crate) struct AlwaysFailing;

    #[async_trait]
    impl Evaluator for AlwaysFailing {
        async fn evaluate(
            &self,
            _template: EvalTemplate,
            _field: SubjectField,
            _text: &str,
            _model: &str,
        ) -> Result<Vec<EvalRecord>, DialogueError> {
            Err(DialogueError::EvaluationError("service down".to_string()))
        }
    }

    fn record(output: &str, reason: &str) -> EvalRecord {
        EvalRecord {
            output: serde_json::Value::String(output.to_string()),
            reason: Some(reason.to_string()),
        }
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_subject_field_addressing() {
        assert_eq!(EvalTemplate::Tone.subject_field(), SubjectField::Input);
        assert_eq!(EvalTemplate::Coherence.subject_field(), SubjectField::Output);
        assert_eq!(EvalTemplate::Resolution.subject_field(), SubjectField::Output);
        assert_eq!(
            EvalTemplate::Coherence.template_name(),
            "conversation_coherence"
        );
    }

    #[test]
    fn test_tone_body_addresses_input() {
        let body = request_body(
            EvalTemplate::Tone,
            EvalTemplate::Tone.subject_field(),
            "Glad you asked!",
            "turing_flash",
        );
        assert_eq!(
            body,
            serde_json::json!({
                "eval_templates": "tone",
                "inputs": {"input": "Glad you asked!"},
                "model_name": "turing_flash",
            })
        );
    }

    #[test]
    fn test_conversation_bodies_address_output() {
        for (template, name) in [
            (EvalTemplate::Coherence, "conversation_coherence"),
            (EvalTemplate::Resolution, "conversation_resolution"),
        ] {
            let body = request_body(
                template,
                template.subject_field(),
                "We agree, then.",
                "turing_flash",
            );
            assert_eq!(body["eval_templates"], name);
            assert_eq!(
                body["inputs"],
                serde_json::json!({"output": "We agree, then."})
            );
            assert_eq!(body["model_name"], "turing_flash");
        }
    }

    #[test]
    fn test_first_utterance_only_gets_tone() {
        assert_eq!(EvalTemplate::for_utterance(true), &[EvalTemplate::Tone]);
        assert_eq!(EvalTemplate::for_utterance(false).len(), 3);
    }

    #[test]
    fn test_credentials_require_both_values() {
        assert!(EvaluatorCredentials::from_parts(Some("k".into()), Some("s".into())).is_some());
        assert!(EvaluatorCredentials::from_parts(Some("k".into()), None).is_none());
        assert!(EvaluatorCredentials::from_parts(Some("".into()), Some("s".into())).is_none());
    }

    #[test]
    fn test_eval_response_parsing() {
        let parsed: EvalResponse = serde_json::from_str(
            r#"{"eval_results": [{"output": "Passed", "reason": "coherent"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.eval_results[0].label(), "Passed");

        let numeric: EvalRecord = serde_json::from_str(r#"{"output": 0.8}"#).unwrap();
        assert_eq!(numeric.label(), "0.8");
        assert_eq!(numeric.reason, None);
    }

    #[tokio::test]
    async fn test_disabled_reports_unavailable() {
        let outcome = QualityEvaluator::disabled()
            .evaluate(EvalTemplate::Tone, "hello")
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.template(), EvalTemplate::Tone);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_model() {
        let scripted = Arc::new(ScriptedEvaluator::default());
        scripted.replies.lock().unwrap().extend([
            Err("boom".to_string()),
            Ok(Vec::new()),
            Ok(vec![record("calm", "measured wording")]),
        ]);
        let quality = QualityEvaluator::new(
            scripted.clone(),
            models(&["first", "second", "third"]),
            Duration::from_secs(1),
        );

        let outcome = quality.evaluate(EvalTemplate::Coherence, "text").await;
        assert_eq!(
            outcome,
            EvaluationOutcome::Scored {
                template: EvalTemplate::Coherence,
                label: "calm".to_string(),
                rationale: "measured wording".to_string(),
                model: "third".to_string(),
            }
        );

        let calls = scripted.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, field, _)| *field == SubjectField::Output));
    }

    #[tokio::test]
    async fn test_exhausted_candidates_are_unavailable() {
        let quality = QualityEvaluator::new(
            Arc::new(AlwaysFailing),
            models(&["a", "b"]),
            Duration::from_secs(1),
        );
        let outcomes = quality.evaluate_utterance("text", false).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| !o.is_success()));
    }
}
