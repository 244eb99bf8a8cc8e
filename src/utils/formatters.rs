//! # Report Formatters
//!
//! Renders a `RunReport` as a standalone HTML page, an XML document, or JSON.

use crate::tester::{CaseResult, RunReport};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt::Write as _;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Html,
    Xml,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Xml => "xml",
            ReportFormat::Json => "json",
        }
    }
}

pub fn render(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Html => Ok(render_html(report)),
        ReportFormat::Xml => Ok(render_xml(report)),
        ReportFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
        }
    }
}

/// Escapes text for HTML element content and quoted attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes text for XML, dropping characters XML 1.0 cannot represent.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            _ => out.push(c),
        }
    }
    out
}

/// Argument names become element names, so anything outside `[A-Za-z0-9_.-]` is replaced.
fn xml_element_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        out.insert(0, '_');
    }
    out
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

const HTML_STYLE: &str = r#"
        :root {
            --blue: #106AED; --blue-light: #DEEBFF;
            --gray-1: #F5F8FA; --gray-2: #EBF1F5; --gray-3: #DCE4EB;
            --gray-6: #8C9DAD; --gray-7: #5C7080; --gray-9: #1C2B35;
            --red: #DB2020; --red-light: #FFE0E0; --green: #07936A;
            --radius: 4px;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: -apple-system, "Segoe UI", Roboto, Arial, sans-serif;
               background: var(--gray-1); color: var(--gray-9); line-height: 1.5; font-size: 14px; }
        .container { max-width: 1200px; margin: 0 auto; padding: 20px; }
        .header { margin-bottom: 24px; padding-bottom: 16px; border-bottom: 1px solid var(--gray-3); }
        .title { font-size: 24px; font-weight: 600; }
        .subtitle { color: var(--gray-7); margin-top: 4px; }
        .stats-cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr));
                       gap: 16px; margin-bottom: 24px; }
        .stat-card { background: white; border-radius: var(--radius); padding: 16px;
                     box-shadow: 0 1px 2px rgba(31, 35, 41, 0.08); }
        .stat-card-title { font-size: 13px; color: var(--gray-7); margin-bottom: 8px; }
        .stat-card-value { font-size: 24px; font-weight: 600; }
        .stat-card-unit { font-size: 12px; color: var(--gray-6); margin-left: 4px; }
        .prompt-section { margin-bottom: 32px; }
        .prompt-title { font-size: 18px; font-weight: 600; margin-bottom: 16px; }
        .prompt-badge { font-size: 12px; font-weight: 500; padding: 2px 8px; border-radius: 12px;
                        margin-left: 8px; background: var(--blue-light); color: var(--blue); }
        .case-card { background: white; border-radius: var(--radius); margin-bottom: 16px;
                     box-shadow: 0 1px 2px rgba(31, 35, 41, 0.08); overflow: hidden; }
        .case-card.failed { border-left: 4px solid var(--red); }
        .case-header { padding: 16px; border-bottom: 1px solid var(--gray-2); display: flex;
                       justify-content: space-between; cursor: pointer; }
        .case-id { font-size: 12px; color: var(--gray-6); margin-left: 8px; }
        .case-status { font-size: 12px; font-weight: 600; margin-left: 8px; color: var(--green); }
        .case-card.failed .case-status { color: var(--red); }
        .case-metrics { font-size: 12px; color: var(--gray-7); }
        .case-content { display: none; padding: 16px; }
        .case-content.expanded { display: block; }
        .case-grid { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; }
        .case-section { margin-bottom: 16px; }
        .case-section-title { font-size: 12px; font-weight: 600; text-transform: uppercase;
                              color: var(--gray-7); margin-bottom: 8px; letter-spacing: 0.5px; }
        .code-block { background: var(--gray-1); border: 1px solid var(--gray-3); border-radius: var(--radius);
                      padding: 12px; font-family: Consolas, Menlo, monospace; font-size: 12px;
                      white-space: pre-wrap; word-break: break-word; }
        .code-block.error { background: var(--red-light); }
        .token-list { display: flex; gap: 8px; flex-wrap: wrap; }
        .token-item { background: var(--gray-2); border-radius: var(--radius); padding: 8px 12px; font-size: 12px; }
        .args-table { width: 100%; border-collapse: collapse; }
        .args-table th, .args-table td { padding: 8px 12px; text-align: left; border-bottom: 1px solid var(--gray-3); }
        .footer { margin-top: 40px; padding-top: 16px; border-top: 1px solid var(--gray-3);
                  font-size: 12px; color: var(--gray-6); text-align: center; }
"#;

pub fn render_html(report: &RunReport) -> String {
    let test_time = report.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let mut html = String::new();

    // Writing into a String cannot fail.
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Prompt Test Report - {test_time}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1 class="title">Prompt Test Report</h1>
            <div class="subtitle">Run started: {test_time}</div>
        </div>
        <div class="stats-cards">
            <div class="stat-card"><div class="stat-card-title">Test cases</div><div class="stat-card-value">{total}</div></div>
            <div class="stat-card"><div class="stat-card-title">Prompts</div><div class="stat-card-value">{prompts}</div></div>
            <div class="stat-card"><div class="stat-card-title">Failed cases</div><div class="stat-card-value">{failed}</div></div>
            <div class="stat-card"><div class="stat-card-title">Average response time</div><div class="stat-card-value">{avg:.2}<span class="stat-card-unit">s</span></div></div>
            <div class="stat-card"><div class="stat-card-title">Total tokens</div><div class="stat-card-value">{tokens}<span class="stat-card-unit">tokens</span></div></div>
        </div>
"#,
        test_time = test_time,
        style = HTML_STYLE,
        total = report.total_cases(),
        prompts = report.prompts.len(),
        failed = report.failures().len(),
        avg = report.average_response_secs(),
        tokens = format_thousands(report.total_tokens()),
    );

    for prompt in &report.prompts {
        let _ = write!(
            html,
            r#"
        <div class="prompt-section">
            <h2 class="prompt-title">{name}<span class="prompt-badge">{vendor} - {model}</span></h2>
"#,
            name = escape_html(&prompt.prompt_name),
            vendor = escape_html(&prompt.vendor),
            model = escape_html(&prompt.model),
        );
        for case in &prompt.cases {
            render_html_case(&mut html, case);
        }
        html.push_str("        </div>\n");
    }

    html.push_str(
        r#"
        <div class="footer"><p>Generated by aitest</p></div>
    </div>
    <script>
        document.querySelectorAll('.case-header').forEach(header => {
            header.addEventListener('click', () => header.nextElementSibling.classList.toggle('expanded'));
        });
    </script>
</body>
</html>
"#,
    );
    html
}

fn render_html_case(html: &mut String, case: &CaseResult) {
    let failed = !case.is_success();

    let args_html = if case.case_args.is_empty() {
        String::new()
    } else {
        let rows: String = case
            .case_args
            .iter()
            .map(|(k, v)| {
                format!(
                    "<tr><td>{}</td><td>{}</td></tr>",
                    escape_html(k),
                    escape_html(v)
                )
            })
            .collect();
        format!(
            r#"<div class="case-section"><div class="case-section-title">Arguments</div>
                    <table class="args-table"><tr><th>Name</th><th>Value</th></tr>{}</table></div>"#,
            rows
        )
    };

    let expected_html = case
        .expected
        .as_deref()
        .map(|e| {
            format!(
                r#"<div class="case-section"><div class="case-section-title">Expected</div><div>{}</div></div>"#,
                escape_html(e)
            )
        })
        .unwrap_or_default();

    let tokens_html = match case.usage() {
        Some(usage) => format!(
            r#"<div class="token-list"><div class="token-item">input: {}</div><div class="token-item">output: {}</div><div class="token-item">total: {}</div></div>"#,
            format_thousands(u64::from(usage.input_tokens)),
            format_thousands(u64::from(usage.output_tokens)),
            format_thousands(u64::from(usage.total_tokens)),
        ),
        None => r#"<div class="token-list"><div class="token-item">n/a</div></div>"#.to_string(),
    };

    let _ = write!(
        html,
        r#"            <div class="case-card{card_class}">
                <div class="case-header">
                    <div>{name}<span class="case-id">#{id}</span><span class="case-status">{status}</span></div>
                    <div class="case-metrics">Response time: {elapsed:.2}s, attempts: {attempts}{answered_by}</div>
                </div>
                <div class="case-content">
                    <div class="case-section"><div class="case-section-title">Description</div><div>{description}</div></div>
                    {args_html}
                    {expected_html}
                    <div class="case-grid">
                        <div class="case-section"><div class="case-section-title">User input</div><div class="code-block">{content}</div></div>
                        <div class="case-section"><div class="case-section-title">{output_title}</div><div class="code-block{output_class}">{output}</div></div>
                    </div>
                    <div class="case-section"><div class="case-section-title">Prompt</div><div class="code-block">{prompt}</div></div>
                    <div class="case-section"><div class="case-section-title">Token usage</div>{tokens_html}</div>
                </div>
            </div>
"#,
        card_class = if failed { " failed" } else { "" },
        name = escape_html(&case.case_name),
        id = escape_html(&case.case_id),
        status = if failed { "FAILED" } else { "OK" },
        elapsed = case.elapsed_secs,
        attempts = case.attempts,
        answered_by = case
            .response_model()
            .map(|m| format!(", model: {}", escape_html(m)))
            .unwrap_or_default(),
        description = escape_html(case.case_description.as_deref().unwrap_or("No description")),
        args_html = args_html,
        expected_html = expected_html,
        content = escape_html(&case.case_content),
        output_title = if failed { "Error" } else { "AI output" },
        output_class = if failed { " error" } else { "" },
        output = escape_html(&case.output_text()),
        prompt = escape_html(&case.processed_prompt),
        tokens_html = tokens_html,
    );
}

pub fn render_xml(report: &RunReport) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<TestResults>\n");
    let _ = writeln!(
        xml,
        "  <TestTime>{}</TestTime>",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    for prompt in &report.prompts {
        let _ = writeln!(
            xml,
            "  <PromptTest name=\"{}\">",
            escape_xml(&prompt.prompt_name)
        );
        for case in &prompt.cases {
            let _ = writeln!(
                xml,
                "    <Case id=\"{}\" name=\"{}\" status=\"{}\">",
                escape_xml(&case.case_id),
                escape_xml(&case.case_name),
                if case.is_success() { "success" } else { "failure" }
            );
            if let Some(description) = &case.case_description {
                let _ = writeln!(xml, "      <Description>{}</Description>", escape_xml(description));
            }
            let _ = writeln!(xml, "      <PromptInfo>");
            let _ = writeln!(xml, "        <Model>{}</Model>", escape_xml(&case.model));
            let _ = writeln!(xml, "        <Vendor>{}</Vendor>", escape_xml(&case.vendor));
            let _ = writeln!(
                xml,
                "        <OriginalPrompt>{}</OriginalPrompt>",
                escape_xml(&case.prompt_text)
            );
            let _ = writeln!(
                xml,
                "        <ProcessedPrompt>{}</ProcessedPrompt>",
                escape_xml(&case.processed_prompt)
            );
            let _ = writeln!(xml, "      </PromptInfo>");
            if !case.case_args.is_empty() {
                let _ = writeln!(xml, "      <Args>");
                for (key, value) in &case.case_args {
                    let tag = xml_element_name(key);
                    let _ = writeln!(xml, "        <{tag}>{}</{tag}>", escape_xml(value), tag = tag);
                }
                let _ = writeln!(xml, "      </Args>");
            }
            if let Some(expected) = &case.expected {
                let _ = writeln!(xml, "      <Expected>{}</Expected>", escape_xml(expected));
            }
            let _ = writeln!(
                xml,
                "      <CaseContent>{}</CaseContent>",
                escape_xml(&case.case_content)
            );
            let _ = writeln!(xml, "      <Output>{}</Output>", escape_xml(&case.output_text()));
            if let Some(model) = case.response_model() {
                let _ = writeln!(xml, "      <ResponseModel>{}</ResponseModel>", escape_xml(model));
            }
            let _ = writeln!(xml, "      <Metrics>");
            let _ = writeln!(xml, "        <ElapsedTime>{:.3}</ElapsedTime>", case.elapsed_secs);
            let _ = writeln!(xml, "        <Attempts>{}</Attempts>", case.attempts);
            if let Some(usage) = case.usage() {
                let _ = writeln!(xml, "        <Tokens>");
                let _ = writeln!(xml, "          <input_tokens>{}</input_tokens>", usage.input_tokens);
                let _ = writeln!(xml, "          <output_tokens>{}</output_tokens>", usage.output_tokens);
                let _ = writeln!(xml, "          <total_tokens>{}</total_tokens>", usage.total_tokens);
                let _ = writeln!(xml, "        </Tokens>");
            }
            let _ = writeln!(xml, "      </Metrics>");
            let _ = writeln!(xml, "    </Case>");
        }
        let _ = writeln!(xml, "  </PromptTest>");
    }

    xml.push_str("</TestResults>\n");
    xml
}
