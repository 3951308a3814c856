//! Plan and tree diff display

use crate::ui;
use colored::Colorize;
use reconcile::{ConfigTree, Method, Plan, State};
use similar::{ChangeTag, TextDiff};

/// Lines that differ between two pretty-printed trees
pub fn tree_changes(before: &ConfigTree, after: &ConfigTree) -> Vec<(ChangeTag, String)> {
    let before = pretty(before);
    let after = pretty(after);
    TextDiff::from_lines(&before, &after)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .map(|change| (change.tag(), change.value().trim_end().to_string()))
        .collect()
}

fn pretty(tree: &ConfigTree) -> String {
    let mut text = serde_json::to_string_pretty(tree).unwrap_or_default();
    text.push('\n');
    text
}

/// Show a line diff of before and after
pub fn display_tree_diff(before: &ConfigTree, after: &ConfigTree) {
    let changes = tree_changes(before, after);
    if changes.is_empty() {
        ui::dim("(no configuration change)");
        return;
    }
    for (tag, line) in changes {
        match tag {
            ChangeTag::Delete => println!("    {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("    {}", format!("+ {line}").green()),
            ChangeTag::Equal => {}
        }
    }
}

/// Display the requests of a plan
pub fn display_plan(resource: &str, state: State, plan: &Plan) {
    if plan.is_empty() {
        println!();
        println!("  {} {}: no changes needed", "✓".green(), resource);
        return;
    }

    println!();
    println!(
        "┌─ {} ({}) ─────────────────────────────────────┐",
        resource.bold(),
        state.as_str()
    );
    println!("│");
    for request in &plan.requests {
        let symbol = match request.method {
            Method::Delete => "-".red(),
            Method::Patch => "~".yellow(),
        };
        println!("│   {} {}", symbol, request);
    }
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} ({} delete, {} patch)",
        ui::count(plan.requests.len(), "request").bold(),
        plan.deletes().to_string().red(),
        plan.patches().to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print the commands of a plan as JSON, one block per command
pub fn display_commands(plan: &Plan) {
    for command in &plan.commands {
        let label = if command.delete_all {
            format!("{} (all)", command.state.as_str())
        } else {
            command.state.as_str().to_string()
        };
        ui::section(&format!("command: {label}"));
        for line in pretty(&command.config).lines() {
            ui::dim(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tree_changes_lists_only_changed_lines() {
        let before = json!({"interfaces": [{"name": "Ethernet0", "mtu": 9100}]});
        let after = json!({"interfaces": [{"name": "Ethernet0", "mtu": 9000}]});

        let changes = tree_changes(&before, &after);
        assert_eq!(
            changes,
            vec![
                (ChangeTag::Delete, r#"      "mtu": 9100"#.to_string()),
                (ChangeTag::Insert, r#"      "mtu": 9000"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_tree_changes_empty_for_equal_trees() {
        let tree = json!({"domain_id": 1});
        assert!(tree_changes(&tree, &tree).is_empty());
    }
}
