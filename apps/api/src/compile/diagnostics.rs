//! Extracts actionable diagnostics from a LaTeX log after a terminal failure.

use std::io;
use std::path::Path;

use tracing::warn;

/// TeX prefixes every error line with this marker.
const ERROR_MARKER: char = '!';
/// Lines captured per error: the marked line plus two lines of context.
const LINES_PER_ERROR: usize = 3;
/// Lines of log returned when no marked line exists.
const TAIL_LINES: usize = 30;

pub const NO_LOG_MESSAGE: &str = "No log file produced.";

/// Pulls every error record out of `log`.
///
/// Each line whose first non-blank character is `!` yields one record made of
/// that line and the two following lines. Records are joined with a newline.
/// Without any marked line the last 30 lines are returned verbatim.
pub fn extract_diagnostics(log: &str) -> String {
    let lines: Vec<&str> = log.split_inclusive('\n').collect();

    let records: Vec<String> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim_start().starts_with(ERROR_MARKER))
        .map(|(i, _)| lines[i..(i + LINES_PER_ERROR).min(lines.len())].concat())
        .collect();

    if records.is_empty() {
        lines[lines.len().saturating_sub(TAIL_LINES)..].concat()
    } else {
        records.join("\n")
    }
}

/// Reads the log at `log_path` and extracts diagnostics, falling back to the
/// compiler's stderr (or a fixed message) when no log was written.
pub async fn collect_diagnostics(log_path: &Path, stderr: &str) -> String {
    match tokio::fs::read(log_path).await {
        // TeX logs are not guaranteed to be valid UTF-8.
        Ok(bytes) => extract_diagnostics(&String::from_utf8_lossy(&bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if stderr.trim().is_empty() {
                NO_LOG_MESSAGE.to_string()
            } else {
                stderr.to_string()
            }
        }
        Err(e) => {
            warn!("Could not read log file {}: {e}", log_path.display());
            format!("Could not read log file: {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED_LOG: &str = "This is pdfTeX, Version 3.141592653\n\
(./resume.tex\n\
LaTeX2e <2023-11-01>\n\
./resume.tex:12: Undefined control sequence.\n\
! Undefined control sequence.\n\
l.12 \\textbff\n\
{Ada}\n\
more noise\n\
! Emergency stop.\n\
<*> resume.tex\n\
\n\
No pages of output.\n";

    #[test]
    fn test_marked_lines_capture_two_lines_of_context() {
        let diagnostics = extract_diagnostics(FAILED_LOG);
        assert_eq!(
            diagnostics,
            "! Undefined control sequence.\nl.12 \\textbff\n{Ada}\n\n\
! Emergency stop.\n<*> resume.tex\n\n"
        );
    }

    #[test]
    fn test_indented_marker_counts() {
        let diagnostics = extract_diagnostics("ok\n   ! Missing $ inserted.\nctx\n");
        assert!(diagnostics.starts_with("   ! Missing $ inserted."));
        assert!(diagnostics.contains("ctx"));
    }

    #[test]
    fn test_marker_on_last_line_is_truncated_record() {
        assert_eq!(extract_diagnostics("a\nb\n! Fatal"), "! Fatal");
    }

    #[test]
    fn test_no_marker_returns_last_thirty_lines() {
        let log: String = (1..=50).map(|i| format!("line {i}\n")).collect();
        let expected: String = (21..=50).map(|i| format!("line {i}\n")).collect();
        assert_eq!(extract_diagnostics(&log), expected);
    }

    #[test]
    fn test_short_log_without_marker_is_returned_whole() {
        let log = "line 1\nline 2\nline 3";
        assert_eq!(extract_diagnostics(log), log);
    }

    #[tokio::test]
    async fn test_missing_log_falls_back_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("resume.log");

        let from_stderr = collect_diagnostics(&log_path, "kpathsea: fatal error").await;
        assert_eq!(from_stderr, "kpathsea: fatal error");

        let fixed = collect_diagnostics(&log_path, "  \n").await;
        assert_eq!(fixed, NO_LOG_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_utf8_log_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("resume.log");
        tokio::fs::write(&log_path, b"\xff\xfe junk\n! LaTeX Error: File `x.sty' not found.\n")
            .await
            .unwrap();

        let diagnostics = collect_diagnostics(&log_path, "ignored").await;
        assert!(diagnostics.contains("! LaTeX Error: File `x.sty' not found."));
    }
}
