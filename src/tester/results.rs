use crate::llm::TokenUsage;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Success {
        content: String,
        /// Model name as reported by the provider, e.g. a dated snapshot.
        model: String,
        usage: TokenUsage,
    },
    Failure { error: String },
}

/// Everything recorded about one case of one prompt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub prompt_name: String,
    pub prompt_text: String,
    pub processed_prompt: String,
    pub model: String,
    pub vendor: String,
    pub case_id: String,
    pub case_name: String,
    pub case_description: Option<String>,
    pub case_content: String,
    pub case_args: BTreeMap<String, String>,
    pub expected: Option<String>,
    pub outcome: CaseOutcome,
    /// Wall-clock seconds including retries.
    pub elapsed_secs: f64,
    pub attempts: u32,
}

impl CaseResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CaseOutcome::Success { .. })
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        match &self.outcome {
            CaseOutcome::Success { usage, .. } => Some(usage),
            CaseOutcome::Failure { .. } => None,
        }
    }

    /// The model that actually answered, when the case succeeded.
    pub fn response_model(&self) -> Option<&str> {
        match &self.outcome {
            CaseOutcome::Success { model, .. } => Some(model.as_str()),
            CaseOutcome::Failure { .. } => None,
        }
    }

    /// Model output, or the error text for failed cases.
    pub fn output_text(&self) -> String {
        match &self.outcome {
            CaseOutcome::Success { content, .. } => content.clone(),
            CaseOutcome::Failure { error } => format!("Error: {}", error),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PromptResults {
    pub prompt_name: String,
    pub vendor: String,
    pub model: String,
    pub cases: Vec<CaseResult>,
}

/// The outcome of one run, grouped per prompt in run order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub prompts: Vec<PromptResults>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            prompts: Vec::new(),
        }
    }

    pub fn cases(&self) -> impl Iterator<Item = &CaseResult> {
        self.prompts.iter().flat_map(|p| p.cases.iter())
    }

    pub fn total_cases(&self) -> usize {
        self.prompts.iter().map(|p| p.cases.len()).sum()
    }

    pub fn failures(&self) -> Vec<&CaseResult> {
        self.cases().filter(|c| !c.is_success()).collect()
    }

    pub fn average_response_secs(&self) -> f64 {
        let total = self.total_cases();
        if total == 0 {
            return 0.0;
        }
        self.cases().map(|c| c.elapsed_secs).sum::<f64>() / total as f64
    }

    pub fn total_tokens(&self) -> u64 {
        self.cases()
            .filter_map(CaseResult::usage)
            .map(|u| u64::from(u.total_tokens))
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn case_result(name: &str, outcome: CaseOutcome, elapsed_secs: f64) -> CaseResult {
        CaseResult {
            prompt_name: "translate".to_string(),
            prompt_text: "Translate into {{language}}.".to_string(),
            processed_prompt: "Translate into French.".to_string(),
            model: "gpt-4o-mini".to_string(),
            vendor: "openai".to_string(),
            case_id: format!("id-{}", name),
            case_name: name.to_string(),
            case_description: Some("Greets <politely> & briefly".to_string()),
            case_content: "Hello".to_string(),
            case_args: BTreeMap::from([("language".to_string(), "French".to_string())]),
            expected: Some("A French greeting".to_string()),
            outcome,
            elapsed_secs,
            attempts: 1,
        }
    }

    pub fn sample_report() -> RunReport {
        let started_at = Local::now();
        let mut report = RunReport::new(started_at);
        report.prompts.push(PromptResults {
            prompt_name: "translate".to_string(),
            vendor: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            cases: vec![
                case_result(
                    "greeting",
                    CaseOutcome::Success {
                        content: "Bonjour".to_string(),
                        model: "gpt-4o-mini-2024-07-18".to_string(),
                        usage: TokenUsage::new(10, 5),
                    },
                    1.5,
                ),
                case_result(
                    "farewell",
                    CaseOutcome::Failure {
                        error: "API request failed with status 500: boom".to_string(),
                    },
                    0.5,
                ),
            ],
        });
        report
    }
}
