use serde::Serialize;
use storyforest_core::quality::{QualityFinding, QualityIssue};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let render = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{cell:w$}")
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));
    for row in rows {
        println!("{}", render(row));
    }
}

pub fn print_issues(issues: &[QualityIssue]) {
    for issue in issues {
        println!("  - {}", issue.message);
        println!("    suggestion: {}", issue.suggestion);
    }
}

pub fn print_finding(finding: &QualityFinding) {
    if finding.satisfied {
        println!("All INVEST criteria satisfied ({}).", finding.source);
    } else {
        println!(
            "{} quality issue(s) ({}):",
            finding.issues.len(),
            finding.source
        );
        print_issues(&finding.issues);
    }
    if let Some(summary) = &finding.summary {
        println!("\n{summary}");
    }
}
