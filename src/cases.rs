//! # Prompt and Test Case Definitions
//!
//! `prompts.json` declares the system prompts under test. Every `*.json` file
//! in the cases directory binds a list of test cases to one prompt through its
//! `caseName` field.

use crate::llm::Provider;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_PROMPTS_FILE: &str = "prompts.json";
pub const DEFAULT_CASES_DIR: &str = "cases";

/// One prompt under test.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub name: String,
    pub vendor: Provider,
    pub model: String,
    /// System prompt; may contain `{{param}}` placeholders.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Deserialize, Debug)]
struct PromptsFile {
    #[serde(default)]
    prompts: Vec<PromptConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestCase {
    #[serde(deserialize_with = "deserialize_case_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Sent to the model as the user message.
    pub content: String,
    #[serde(default)]
    pub args: Option<Map<String, Value>>,
    /// Older case files carry the translation target here instead of in `args`.
    #[serde(default, rename = "targetLanguage")]
    pub target_language: Option<String>,
    /// Free-text criteria a reviewer checks the output against.
    #[serde(default)]
    pub expected: Option<String>,
}

impl TestCase {
    /// Arguments as displayed in reports, with the legacy field folded in.
    pub fn display_args(&self) -> BTreeMap<String, String> {
        if let Some(args) = &self.args {
            args.iter()
                .map(|(k, v)| (k.clone(), value_to_text(v)))
                .collect()
        } else if let Some(lang) = &self.target_language {
            BTreeMap::from([("language".to_string(), lang.clone())])
        } else {
            BTreeMap::new()
        }
    }
}

/// Strings are used verbatim; everything else uses its JSON text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn deserialize_case_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[derive(Deserialize, Debug)]
struct CaseFile {
    #[serde(rename = "caseName")]
    case_name: String,
    #[serde(default)]
    cases: Vec<TestCase>,
}

/// Test cases grouped by the prompt they exercise.
#[derive(Debug, Default, Clone)]
pub struct CaseSet {
    cases: BTreeMap<String, Vec<TestCase>>,
    files: Vec<PathBuf>,
}

impl CaseSet {
    pub fn get(&self, prompt_name: &str) -> &[TestCase] {
        self.cases
            .get(prompt_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn prompt_names(&self) -> impl Iterator<Item = &str> {
        self.cases.keys().map(String::as_str)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn total_cases(&self) -> usize {
        self.cases.values().map(Vec::len).sum()
    }
}

/// Loads the prompt definitions.
pub fn load_prompts(prompts_file: &Path) -> Result<Vec<PromptConfig>> {
    let content = fs::read_to_string(prompts_file)
        .with_context(|| format!("Failed to read prompts file: {}", prompts_file.display()))?;
    let parsed: PromptsFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse prompts file: {}", prompts_file.display()))?;

    if parsed.prompts.is_empty() {
        bail!("No prompts defined in {}", prompts_file.display());
    }

    let mut seen = HashSet::new();
    for prompt in &parsed.prompts {
        if !seen.insert(prompt.name.as_str()) {
            bail!(
                "Duplicate prompt name '{}' in {}",
                prompt.name,
                prompts_file.display()
            );
        }
    }

    info!(
        "Loaded {} prompt(s) from {}",
        parsed.prompts.len(),
        prompts_file.display()
    );
    Ok(parsed.prompts)
}

/// Loads every `*.json` case file in `cases_dir`, in path order.
pub fn load_test_cases(cases_dir: &Path) -> Result<CaseSet> {
    if !cases_dir.is_dir() {
        bail!("Test case directory not found: {}", cases_dir.display());
    }

    let dir_str = cases_dir
        .to_str()
        .with_context(|| format!("Non UTF-8 cases directory: {}", cases_dir.display()))?;
    // Brackets and wildcards in the directory name are literal.
    let pattern = Path::new(&glob::Pattern::escape(dir_str)).join("*.json");
    let pattern_str = pattern
        .to_str()
        .with_context(|| format!("Non UTF-8 cases directory: {}", cases_dir.display()))?;
    let mut case_files = glob::glob(pattern_str)
        .with_context(|| format!("Invalid case file pattern: {}", pattern_str))?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to list test case files")?;
    case_files.sort();

    if case_files.is_empty() {
        bail!("No test case files (*.json) found in {}", cases_dir.display());
    }

    let mut set = CaseSet::default();
    for case_file in case_files {
        let content = fs::read_to_string(&case_file)
            .with_context(|| format!("Failed to read test case file: {}", case_file.display()))?;
        let parsed: CaseFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse test case file: {}", case_file.display()))?;
        if parsed.case_name.trim().is_empty() {
            bail!("Test case file {} has an empty caseName", case_file.display());
        }

        debug!(
            "Loaded {} case(s) for '{}' from {}",
            parsed.cases.len(),
            parsed.case_name,
            case_file.display()
        );
        set.cases
            .entry(parsed.case_name)
            .or_default()
            .extend(parsed.cases);
        set.files.push(case_file);
    }

    info!(
        "Loaded {} test case(s) from {} file(s) in {}",
        set.total_cases(),
        set.files.len(),
        cases_dir.display()
    );
    Ok(set)
}
