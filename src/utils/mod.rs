//! # Utilities Module
//!
//! Prompt templating, report rendering and report file output.

pub mod formatters;
pub mod report_recorder;
pub mod template;
