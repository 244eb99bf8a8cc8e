//! Choosing which prompts a run covers.

use crate::cases::PromptConfig;
use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Validates `--prompt` names against the loaded prompts, keeping file order
/// when `requested` is empty.
pub fn resolve_requested(prompts: &[PromptConfig], requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(prompts.iter().map(|p| p.name.clone()).collect());
    }
    let mut selected = Vec::new();
    for name in requested {
        if !prompts.iter().any(|p| &p.name == name) {
            let known: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
            bail!(
                "Unknown prompt '{}'. Available prompts: {}",
                name,
                known.join(", ")
            );
        }
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    Ok(selected)
}

/// Parses a menu answer: empty or `all` selects everything, otherwise
/// comma or space separated 1-based indices.
pub fn parse_selection(input: &str, names: &[String]) -> Result<Vec<String>> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("all") {
        return Ok(names.to_vec());
    }

    let mut selected = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let index: usize = token
            .parse()
            .with_context(|| format!("'{}' is not a number", token))?;
        if index == 0 || index > names.len() {
            bail!("Selection {} is out of range 1-{}", index, names.len());
        }
        let name = &names[index - 1];
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    Ok(selected)
}

/// Numbered menu on the terminal; asks again until the answer parses.
pub fn interactive_select(names: &[String]) -> Result<Vec<String>> {
    let mut rl = DefaultEditor::new().context("Failed to create line editor")?;

    println!("Select the prompts to test:");
    for (i, name) in names.iter().enumerate() {
        println!("  {}) {}", i + 1, name);
    }
    println!("Enter numbers separated by commas, or press Enter for all.");

    loop {
        match rl.readline("select> ") {
            Ok(line) => match parse_selection(&line, names) {
                Ok(selected) if !selected.is_empty() => return Ok(selected),
                Ok(_) => println!("Select at least one prompt."),
                Err(e) => println!("{}", e),
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                bail!("Prompt selection cancelled")
            }
            Err(err) => return Err(err).context("Failed to read selection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    fn prompts() -> Vec<PromptConfig> {
        ["translate", "summarize", "classify"]
            .iter()
            .map(|name| PromptConfig {
                name: name.to_string(),
                vendor: Provider::OpenAI,
                model: "m".to_string(),
                prompt: "p".to_string(),
                max_tokens: None,
                temperature: None,
            })
            .collect()
    }

    fn names() -> Vec<String> {
        prompts().into_iter().map(|p| p.name).collect()
    }

    #[test]
    fn test_resolve_requested() {
        assert_eq!(resolve_requested(&prompts(), &[]).unwrap(), names());
        assert_eq!(
            resolve_requested(
                &prompts(),
                &["classify".to_string(), "translate".to_string(), "classify".to_string()]
            )
            .unwrap(),
            vec!["classify", "translate"]
        );
        let err = resolve_requested(&prompts(), &["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Unknown prompt 'nope'"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("", &names()).unwrap(), names());
        assert_eq!(parse_selection(" ALL ", &names()).unwrap(), names());
        assert_eq!(
            parse_selection("3, 1 3", &names()).unwrap(),
            vec!["classify", "translate"]
        );
        assert!(parse_selection("0", &names()).is_err());
        assert!(parse_selection("4", &names()).is_err());
        assert!(parse_selection("two", &names()).is_err());
    }
}
