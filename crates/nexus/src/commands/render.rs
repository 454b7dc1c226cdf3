//! Text rendering of sessions, catalogs and diagnostics.

use console::{Style, style};
use nexus_mcp::{Catalog, DiagnosticEvent, Direction, SessionSummary, Surface, SurfaceStatus};

/// Keep only items whose name contains `filter` (case-insensitive).
pub fn filter_catalog(catalog: &Catalog, filter: Option<&str>) -> Catalog {
    let Some(needle) = filter.map(str::to_lowercase) else {
        return catalog.clone();
    };
    let matches = |name: &str| name.to_lowercase().contains(&needle);

    Catalog {
        tools: catalog
            .tools
            .iter()
            .filter(|t| matches(&t.name))
            .cloned()
            .collect(),
        resources: catalog
            .resources
            .iter()
            .filter(|r| matches(&r.name) || matches(&r.uri))
            .cloned()
            .collect(),
        prompts: catalog
            .prompts
            .iter()
            .filter(|p| matches(&p.name))
            .cloned()
            .collect(),
        status: catalog.status.clone(),
    }
}

pub fn print_summary(summary: &SessionSummary) {
    let dim = Style::new().dim();
    println!("{}", style("Session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));

    match summary.server_info {
        Some(ref info) => println!(
            "  Server:     {} {}",
            style(&info.name).cyan(),
            dim.apply_to(&info.version)
        ),
        None => println!("  Server:     {}", dim.apply_to("(not reported)")),
    }
    println!(
        "  Protocol:   {}",
        summary.protocol_version.as_deref().unwrap_or("(not reported)")
    );
    println!("  Transport:  {}", summary.transport);
    println!("  Endpoint:   {}", summary.endpoint);

    let declared = summary.capabilities.declared();
    if declared.is_empty() {
        println!("  Declares:   {}", dim.apply_to("(nothing)"));
    } else {
        println!("  Declares:   {}", declared.join(", "));
    }
    println!();
}

pub fn print_catalog(catalog: &Catalog, verbose: bool) {
    for surface in [Surface::Tools, Surface::Resources, Surface::Prompts] {
        print_section(catalog, surface, verbose);
    }
}

/// Print one surface of the catalog, or why it is missing.
pub fn print_section(catalog: &Catalog, surface: Surface, verbose: bool) {
    let (title, shown) = match surface {
        Surface::Tools => ("Tools", catalog.tools.len()),
        Surface::Resources => ("Resources", catalog.resources.len()),
        Surface::Prompts => ("Prompts", catalog.prompts.len()),
    };

    match catalog.status_of(surface) {
        Some(SurfaceStatus::Unsupported { code, message }) => {
            println!(
                "{} {}",
                style(title).bold(),
                style(format!("(unsupported: {} {})", code, message)).dim()
            );
        }
        Some(SurfaceStatus::Failed { message }) => {
            println!(
                "{} {}",
                style(title).bold(),
                style(format!("(failed: {})", message)).red()
            );
        }
        _ if shown == 0 => {
            println!("{} {}", style(title).bold(), style("(none)").dim());
        }
        _ => {
            println!("{} ({})", style(title).bold(), shown);
            print_items(catalog, surface, verbose);
        }
    }
    println!();
}

fn print_items(catalog: &Catalog, surface: Surface, verbose: bool) {
    match surface {
        Surface::Tools => {
            for tool in &catalog.tools {
                print_item(&tool.name, tool.description.as_deref());
                if verbose && let Some(ref schema) = tool.input_schema {
                    let pretty = serde_json::to_string_pretty(schema).unwrap_or_default();
                    for line in pretty.lines() {
                        println!("      {}", style(line).dim());
                    }
                }
            }
        }
        Surface::Resources => {
            for resource in &catalog.resources {
                let label = if resource.name.is_empty() {
                    resource.uri.clone()
                } else {
                    format!("{} ({})", resource.name, resource.uri)
                };
                print_item(&label, resource.description.as_deref());
            }
        }
        Surface::Prompts => {
            for prompt in &catalog.prompts {
                print_item(&prompt.name, prompt.description.as_deref());
            }
        }
    }
}

fn print_item(name: &str, description: Option<&str>) {
    match description {
        Some(desc) if !desc.is_empty() => {
            println!("  {}  {}", style(name).cyan(), truncate(desc, 70))
        }
        _ => println!("  {}", style(name).cyan()),
    }
}

/// Print diagnostic events newest first.
pub fn print_diagnostics(events: &[DiagnosticEvent], limit: Option<usize>) {
    if events.is_empty() {
        println!("{}", style("(diagnostic log is empty)").dim());
        return;
    }

    for event in events.iter().take(limit.unwrap_or(usize::MAX)) {
        let line = event.to_string();
        let styled = match event.direction {
            Direction::Out => style(line).blue(),
            Direction::In => style(line).green(),
            Direction::Info => style(line).dim(),
            Direction::Error => style(line).red(),
        };
        println!("{}", styled);
    }
}

/// Truncate a string for table display.
pub fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() <= max {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_mcp::{PromptInfo, ResourceInfo, ToolInfo};

    fn catalog() -> Catalog {
        Catalog {
            tools: vec![
                ToolInfo {
                    name: "Echo".to_string(),
                    description: None,
                    input_schema: None,
                },
                ToolInfo {
                    name: "add".to_string(),
                    description: None,
                    input_schema: None,
                },
            ],
            resources: vec![ResourceInfo {
                uri: "file:///echo.txt".to_string(),
                name: "notes".to_string(),
                mime_type: None,
                description: None,
            }],
            prompts: vec![PromptInfo {
                name: "summarize".to_string(),
                description: None,
                arguments: None,
            }],
            status: Vec::new(),
        }
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filtered = filter_catalog(&catalog(), Some("ECHO"));
        assert_eq!(filtered.tools.len(), 1);
        assert_eq!(filtered.tools[0].name, "Echo");
        // resources match on uri too
        assert_eq!(filtered.resources.len(), 1);
        assert!(filtered.prompts.is_empty());
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        assert_eq!(filter_catalog(&catalog(), None), catalog());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description here", 10), "a long ...");
        assert_eq!(truncate("first\nsecond", 20), "first");
    }
}
