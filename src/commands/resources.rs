use anyhow::Result;
use colored::Colorize;
use reconcile::{DeleteOperator, FieldSpec, KeySpec, ResourceSchema};

use crate::resource;
use crate::ui;

pub fn run(name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => describe(resource::find(name)?.as_ref()),
        None => {
            list();
            Ok(())
        }
    }
}

fn list() {
    ui::header("Resources");
    for schema in resource::all() {
        println!("  {:<12} {}", schema.name().bold(), schema.description().dimmed());
    }
    println!();
}

fn describe(schema: &dyn ResourceSchema) -> Result<()> {
    ui::header(schema.name());
    ui::dim(schema.description());

    ui::section("Instances");
    ui::kv("field", schema.instance_field().unwrap_or("(whole resource)"));
    let mergeable = schema.mergeable_fields();
    ui::kv(
        "merged under replaced",
        &if mergeable.is_empty() {
            "(none)".to_string()
        } else {
            mergeable.join(", ")
        },
    );
    ui::kv(
        "delete all",
        &schema
            .root_delete_path()
            .unwrap_or_else(|| "per entry".to_string()),
    );

    ui::section("Keys");
    for line in key_lines(schema.key_spec(), 0) {
        println!("  {line}");
    }

    let defaults = schema.defaults();
    if !defaults.is_empty() {
        ui::section("Defaults");
        for (path, value) in defaults.iter() {
            ui::kv(path, &value.to_string());
        }
    }
    println!();
    Ok(())
}

/// One line per declared field, indented by depth
fn key_lines(spec: &KeySpec, depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, field) in spec.iter() {
        lines.push(format!("{}{}", "  ".repeat(depth), describe_field(name, field)));
        lines.extend(key_lines(field.nested(), depth + 1));
    }
    lines
}

fn describe_field(name: &str, field: &FieldSpec) -> String {
    let mut text = name.to_string();
    if field.is_keyed() {
        text.push_str(&format!(" [{}]", field.identity().join(", ")));
    }
    match field.delete_op() {
        DeleteOperator::Default => {}
        DeleteOperator::RestoreDefault => text.push_str(" (delete restores default)"),
        DeleteOperator::DeleteParentIfEmpty => text.push_str(" (delete removes empty parent)"),
        DeleteOperator::Custom(_) => text.push_str(" (custom delete)"),
    }
    text
}
