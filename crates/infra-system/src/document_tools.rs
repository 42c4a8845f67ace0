// Document tools
// Plain text helpers the external analysis pipeline calls through the CLI

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Characters kept by `condense_financial_data`
pub const CONDENSE_LIMIT: usize = 500;

/// Reply of `read_financial_document` when no text could be extracted
pub const EMPTY_DOCUMENT: &str = "The document appears to be empty.";

/// Fixed reply of `assess_financial_risk`
pub const RISK_PLACEHOLDER: &str =
    "Risk assessment analysis performed on the provided document data.";

/// Extract the text of a PDF
///
/// Never fails: problems are reported in the returned text, since the caller
/// is an agent that reads the answer as-is.
pub fn read_financial_document(path: &Path) -> String {
    if !path.exists() {
        return format!("Error: The file at {} was not found.", path.display());
    }

    // pdf-extract panics on some malformed inputs
    let extracted = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));
    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return format!("Error reading PDF: {}", e),
        Err(_) => return "Error reading PDF: malformed document".to_string(),
    };

    let report = clean_pages(&text);
    if report.trim().is_empty() {
        EMPTY_DOCUMENT.to_string()
    } else {
        report
    }
}

/// Collapse blank lines inside each page (pages are form-feed separated) and
/// terminate every non-empty page with a newline
fn clean_pages(text: &str) -> String {
    let mut report = String::with_capacity(text.len());
    for page in text.split('\x0c') {
        if page.is_empty() {
            continue;
        }
        let mut content = page.to_string();
        while content.contains("\n\n") {
            content = content.replace("\n\n", "\n");
        }
        report.push_str(&content);
        report.push('\n');
    }
    report
}

/// Collapse whitespace runs to single spaces and keep the first 500 characters
pub fn condense_financial_data(financial_data: &str) -> String {
    let processed = financial_data.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = processed.chars().take(CONDENSE_LIMIT).collect();
    format!("Processed Analysis Data: {}...", truncated)
}

/// Risk assessment placeholder; the assessment itself happens in the pipeline
pub fn assess_financial_risk(_financial_data: &str) -> String {
    RISK_PLACEHOLDER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let reply = read_financial_document(Path::new("/nonexistent/report.pdf"));
        assert_eq!(reply, "Error: The file at /nonexistent/report.pdf was not found.");
    }

    #[test]
    fn test_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"plain text, no PDF header").unwrap();

        let reply = read_financial_document(&path);
        assert!(reply.starts_with("Error reading PDF: "), "got {}", reply);
    }

    #[test]
    fn test_clean_pages_collapses_blank_lines() {
        let text = "Revenue\n\n\n\nGrew 10%\x0c\x0cQ2\n\nFlat";
        assert_eq!(clean_pages(text), "Revenue\nGrew 10%\nQ2\nFlat\n");
    }

    #[test]
    fn test_clean_pages_blank_document() {
        assert!(clean_pages("\x0c\n\n\x0c").trim().is_empty());
    }

    #[test]
    fn test_condense_collapses_whitespace() {
        let reply = condense_financial_data("  Net   income\n\trose  ");
        assert_eq!(reply, "Processed Analysis Data: Net income rose...");
    }

    #[test]
    fn test_condense_truncates() {
        let long = "x".repeat(800);
        let reply = condense_financial_data(&long);
        assert_eq!(
            reply,
            format!("Processed Analysis Data: {}...", "x".repeat(CONDENSE_LIMIT))
        );
    }

    #[test]
    fn test_risk_placeholder() {
        assert_eq!(assess_financial_risk("anything"), RISK_PLACEHOLDER);
    }
}
