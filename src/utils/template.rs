//! `{{param}}` substitution for prompt templates.

use crate::cases::{value_to_text, PromptConfig, TestCase};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Name of the prompt that still accepts the old `targetLanguage` case field.
const LEGACY_TRANSLATE_PROMPT: &str = "translate";

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPrompt {
    pub text: String,
    /// `name=value` for every placeholder that was filled.
    pub replaced: Vec<String>,
    /// Placeholders left in the text because the case had no value for them.
    pub missing: Vec<String>,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is valid"))
}

/// Distinct placeholder names in order of first appearance.
pub fn find_parameters(template: &str) -> Vec<String> {
    let mut params: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(template) {
        let name = &caps[1];
        if !params.iter().any(|p| p == name) {
            params.push(name.to_string());
        }
    }
    params
}

/// Fills the prompt's placeholders from the case.
pub fn process_prompt(prompt: &PromptConfig, case: &TestCase) -> ProcessedPrompt {
    let mut text = prompt.prompt.clone();
    let params = find_parameters(&text);
    let mut replaced = Vec::new();
    let mut missing = Vec::new();

    if params.is_empty() {
        return ProcessedPrompt {
            text,
            replaced,
            missing,
        };
    }
    debug!("Placeholders in prompt '{}': {}", prompt.name, params.join(", "));

    if let Some(args) = &case.args {
        for param in &params {
            let placeholder = format!("{{{{{}}}}}", param);
            match args.get(param) {
                Some(value) => {
                    let value = value_to_text(value);
                    text = text.replace(&placeholder, &value);
                    debug!("Replaced {} -> {}", placeholder, value);
                    replaced.push(format!("{}={}", param, value));
                }
                None => missing.push(param.clone()),
            }
        }
        if !replaced.is_empty() {
            info!("Parameters: {}", replaced.join(", "));
        }
        if !missing.is_empty() {
            warn!(
                "Case '{}' is missing parameters: {}",
                case.name,
                missing.join(", ")
            );
        }
    } else if prompt.name == LEGACY_TRANSLATE_PROMPT && case.target_language.is_some() {
        let language = case.target_language.as_deref().unwrap_or_default();
        for param in &params {
            if param == "language" {
                text = text.replace("{{language}}", language);
                info!("Legacy parameter: {{{{language}}}} -> {}", language);
                replaced.push(format!("language={}", language));
            } else {
                missing.push(param.clone());
            }
        }
        if !missing.is_empty() {
            warn!(
                "Case '{}' is missing parameters: {}",
                case.name,
                missing.join(", ")
            );
        }
    } else {
        warn!(
            "Prompt '{}' needs parameters {} but case '{}' has no args",
            prompt.name,
            params.join(", "),
            case.name
        );
        missing = params;
    }

    ProcessedPrompt {
        text,
        replaced,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use serde_json::json;

    fn prompt(name: &str, text: &str) -> PromptConfig {
        PromptConfig {
            name: name.to_string(),
            vendor: Provider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            prompt: text.to_string(),
            max_tokens: None,
            temperature: None,
        }
    }

    fn case(args: Option<serde_json::Value>, target_language: Option<&str>) -> TestCase {
        TestCase {
            id: "1".to_string(),
            name: "case".to_string(),
            description: None,
            content: "Hello".to_string(),
            args: args.and_then(|v| v.as_object().cloned()),
            target_language: target_language.map(str::to_string),
            expected: None,
        }
    }

    #[test]
    fn test_find_parameters_dedups_in_order() {
        assert_eq!(
            find_parameters("{{b}} and {{a}} then {{b}} but not {{ c }}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_replaces_all_occurrences_from_args() {
        let processed = process_prompt(
            &prompt("style", "Write in {{tone}}. Always {{tone}}. Limit {{words}} words."),
            &case(Some(json!({ "tone": "formal", "words": 50 })), None),
        );
        assert_eq!(processed.text, "Write in formal. Always formal. Limit 50 words.");
        assert_eq!(processed.replaced, vec!["tone=formal", "words=50"]);
        assert!(processed.missing.is_empty());
    }

    #[test]
    fn test_missing_args_are_left_in_place() {
        let processed = process_prompt(
            &prompt("style", "{{tone}} / {{audience}}"),
            &case(Some(json!({ "tone": "casual" })), None),
        );
        assert_eq!(processed.text, "casual / {{audience}}");
        assert_eq!(processed.missing, vec!["audience"]);
    }

    #[test]
    fn test_legacy_target_language_for_translate() {
        let processed = process_prompt(
            &prompt("translate", "Translate into {{language}}."),
            &case(None, Some("Japanese")),
        );
        assert_eq!(processed.text, "Translate into Japanese.");

        // Only the translate prompt honours the legacy field.
        let other = process_prompt(
            &prompt("rewrite", "Rewrite in {{language}}."),
            &case(None, Some("Japanese")),
        );
        assert_eq!(other.text, "Rewrite in {{language}}.");
        assert_eq!(other.missing, vec!["language"]);
    }

    #[test]
    fn test_prompt_without_placeholders_is_untouched() {
        let processed = process_prompt(&prompt("plain", "Be concise."), &case(None, None));
        assert_eq!(processed.text, "Be concise.");
        assert!(processed.replaced.is_empty() && processed.missing.is_empty());
    }
}
