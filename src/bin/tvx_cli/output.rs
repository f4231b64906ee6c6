//! Console formatting for command results.

use tvx_conformance::{BatchSummary, VectorStatus};

/// Render an error and its cause chain for the terminal.
pub fn format_error(error: &anyhow::Error) -> String {
    let mut out = format!("\x1b[31mError:\x1b[0m {}\n", error);
    let mut causes = error.chain().skip(1).peekable();
    if causes.peek().is_some() {
        out.push_str("Caused by:\n");
        for (idx, cause) in causes.enumerate() {
            out.push_str(&format!("  {}: {}\n", idx + 1, cause));
        }
    }
    out
}

pub fn print_batch_summary(title: &str, summary: &BatchSummary) {
    eprintln!();
    eprintln!("\x1b[1m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
    eprintln!("\x1b[1m  {}\x1b[0m", title);
    eprintln!("\x1b[1m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
    eprintln!();

    let evaluated = summary.total - summary.skipped;
    let success_rate = if evaluated > 0 {
        100.0 * summary.passed as f64 / evaluated as f64
    } else {
        0.0
    };

    eprintln!("  Vectors:        {}", summary.total);
    eprintln!("  Skipped:        {}", summary.skipped);
    eprintln!(
        "  Result:        \x1b[32m{} passed\x1b[0m / \x1b[{}m{} failed\x1b[0m / \x1b[{}m{} errored\x1b[0m ({:.1}%)",
        summary.passed,
        if summary.failed > 0 { "31" } else { "32" },
        summary.failed,
        if summary.errored > 0 { "31" } else { "32" },
        summary.errored,
        success_rate
    );
    eprintln!();

    let problems: Vec<_> = summary
        .entries
        .iter()
        .filter(|e| matches!(e.status, VectorStatus::Failed | VectorStatus::Errored))
        .collect();
    if !problems.is_empty() {
        eprintln!("  \x1b[1mFailures\x1b[0m");
        for entry in problems {
            let label = match entry.status {
                VectorStatus::Errored => "errored",
                _ => "failed",
            };
            match &entry.error {
                Some(error) => eprintln!("    {:<32} {:<8} {}", entry.source, label, error),
                None => eprintln!("    {:<32} {}", entry.source, label),
            }
        }
        eprintln!();
    }
}
