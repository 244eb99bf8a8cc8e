//! # Tester Module
//!
//! Runs selected prompts against their test cases and collects the results.
//! Cases run sequentially; provider failures are recorded per case.

pub mod prompt_tester;
pub mod results;
pub mod retry;
pub mod selection;

pub use prompt_tester::PromptTester;
pub use results::{CaseResult, RunReport};
