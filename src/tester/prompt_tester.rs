use super::results::{CaseOutcome, CaseResult, PromptResults, RunReport};
use super::retry::{complete_with_retry, RetryPolicy};
use crate::cases::{CaseSet, PromptConfig, TestCase};
use crate::config::Config;
use crate::llm::{ClientRegistry, CompletionRequest};
use crate::utils::template::{find_parameters, process_prompt};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Runs prompts against their test cases, one case at a time.
pub struct PromptTester {
    clients: ClientRegistry,
    retry: RetryPolicy,
    default_max_tokens: u32,
    show_progress: bool,
}

impl PromptTester {
    pub fn new(clients: ClientRegistry, config: &Config) -> Self {
        Self {
            clients,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay()),
            default_max_tokens: config.max_tokens,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn progress_bar(&self, prompt_name: &str, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {msg}: [{bar:30.cyan/blue}] {pos}/{len}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(format!("Testing {}", prompt_name));
        bar
    }

    /// Runs every selected prompt in order. Prompts without cases are skipped.
    pub async fn run_all(
        &self,
        prompts: &[PromptConfig],
        cases: &CaseSet,
        selected: &[String],
    ) -> RunReport {
        let mut report = RunReport::new(Local::now());

        for prompt_name in selected {
            let Some(prompt) = prompts.iter().find(|p| &p.name == prompt_name) else {
                error!("No prompt configuration named {}", prompt_name);
                continue;
            };
            let prompt_cases = cases.get(prompt_name);
            if prompt_cases.is_empty() {
                error!("No test cases found for prompt {}", prompt_name);
                continue;
            }

            let results = self.run_prompt(prompt, prompt_cases).await;
            report.prompts.push(PromptResults {
                prompt_name: prompt.name.clone(),
                vendor: prompt.vendor.to_string(),
                model: prompt.model.clone(),
                cases: results,
            });
        }

        report
    }

    /// Runs all cases of one prompt. A failing case never stops the others.
    #[instrument(skip_all, fields(prompt = %prompt.name))]
    pub async fn run_prompt(&self, prompt: &PromptConfig, cases: &[TestCase]) -> Vec<CaseResult> {
        info!("Testing prompt: {}", prompt.name);
        debug!(
            "Provider: {}, model: {}, cases: {}",
            prompt.vendor,
            prompt.model,
            cases.len()
        );
        let params = find_parameters(&prompt.prompt);
        if !params.is_empty() {
            debug!("Prompt parameters: {}", params.join(", "));
        }

        let bar = self.progress_bar(&prompt.name, cases.len());
        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            bar.suspend(|| info!("Test case: {} (ID: {})", case.name, case.id));
            let case_result = self.run_case(prompt, case).await;
            if case_result.is_success() {
                bar.suspend(|| {
                    info!(
                        "Case {} completed in {:.2}s",
                        case.name, case_result.elapsed_secs
                    )
                });
            }
            results.push(case_result);
            bar.inc(1);
        }
        bar.finish_and_clear();

        results
    }

    async fn run_case(&self, prompt: &PromptConfig, case: &TestCase) -> CaseResult {
        let processed = process_prompt(prompt, case);
        let request = CompletionRequest {
            model: prompt.model.clone(),
            system: processed.text.clone(),
            user: case.content.clone(),
            max_tokens: prompt.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: prompt.temperature,
        };

        let start = Instant::now();
        let (outcome, attempts) = match self.clients.get(prompt.vendor) {
            Ok(client) => {
                let (result, attempts) =
                    complete_with_retry(client.as_ref(), &request, self.retry).await;
                let outcome = match result {
                    Ok(completion) => {
                        debug!(
                            "Token usage: input {}, output {}, total {}",
                            completion.usage.input_tokens,
                            completion.usage.output_tokens,
                            completion.usage.total_tokens
                        );
                        CaseOutcome::Success {
                            content: completion.content,
                            model: completion.model,
                            usage: completion.usage,
                        }
                    }
                    Err(e) => {
                        error!("Test case {} failed: {}", case.name, e);
                        CaseOutcome::Failure {
                            error: e.to_string(),
                        }
                    }
                };
                (outcome, attempts)
            }
            Err(e) => {
                error!("Test case {} failed: {}", case.name, e);
                (
                    CaseOutcome::Failure {
                        error: e.to_string(),
                    },
                    0,
                )
            }
        };
        let elapsed_secs = start.elapsed().as_secs_f64();

        CaseResult {
            prompt_name: prompt.name.clone(),
            prompt_text: prompt.prompt.clone(),
            processed_prompt: processed.text,
            model: prompt.model.clone(),
            vendor: prompt.vendor.to_string(),
            case_id: case.id.clone(),
            case_name: case.name.clone(),
            case_description: case.description.clone(),
            case_content: case.content.clone(),
            case_args: case.display_args(),
            expected: case.expected.clone(),
            outcome,
            elapsed_secs,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, LLMClient, LLMError, Provider, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Echoes the system prompt back; fails for user messages containing "FAIL".
    struct EchoClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.user.contains("FAIL") {
                return Err(LLMError::ApiError {
                    status: 400,
                    body: "rejected".to_string(),
                });
            }
            Ok(Completion {
                content: format!("{} | {}", request.system, request.user),
                model: format!("{}-0613", request.model),
                usage: TokenUsage::new(3, 4),
            })
        }

        fn provider(&self) -> Provider {
            Provider::OpenAI
        }
    }

    fn prompt(name: &str, vendor: Provider) -> PromptConfig {
        PromptConfig {
            name: name.to_string(),
            vendor,
            model: "test-model".to_string(),
            prompt: "Answer in {{language}}.".to_string(),
            max_tokens: None,
            temperature: None,
        }
    }

    fn case(id: &str, content: &str) -> TestCase {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("case-{}", id),
            "content": content,
            "args": { "language": "Spanish" }
        }))
        .unwrap()
    }

    fn tester(client: Arc<EchoClient>) -> PromptTester {
        let config = Config {
            retry_base_delay_ms: 0,
            ..Config::default()
        };
        PromptTester::new(ClientRegistry::default().with_client(client), &config)
            .with_progress(false)
    }

    #[tokio::test]
    async fn test_failed_case_does_not_stop_the_run() {
        let client = Arc::new(EchoClient {
            calls: AtomicUsize::new(0),
        });
        let tester = tester(client.clone());
        let cases = vec![case("1", "FAIL please"), case("2", "Hi")];

        let results = tester
            .run_prompt(&prompt("p", Provider::OpenAI), &cases)
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].is_success());
        assert_eq!(
            results[0].outcome,
            CaseOutcome::Failure {
                error: "API request failed with status 400: rejected".to_string()
            }
        );
        assert_eq!(results[0].attempts, 1);
        assert!(results[1].is_success());
        assert_eq!(results[1].output_text(), "Answer in Spanish. | Hi");
        assert_eq!(results[1].response_model(), Some("test-model-0613"));
        assert_eq!(results[0].response_model(), None);
        assert_eq!(results[1].processed_prompt, "Answer in Spanish.");
        assert_eq!(results[1].prompt_text, "Answer in {{language}}.");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_provider_client_fails_each_case() {
        let client = Arc::new(EchoClient {
            calls: AtomicUsize::new(0),
        });
        let tester = tester(client.clone());

        let results = tester
            .run_prompt(&prompt("p", Provider::Anthropic), &[case("1", "Hi")])
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].outcome,
            CaseOutcome::Failure {
                error: "No API key configured for provider 'anthropic'".to_string()
            }
        );
        assert_eq!(results[0].attempts, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
