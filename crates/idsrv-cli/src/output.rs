use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", pretty(value)),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_heading(title: &str) {
    println!("{}", title.cyan().bold());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn print_as_table(value: &Value) {
    let mut builder = Builder::default();
    match value {
        // The sample API answers with [{type, value}]
        Value::Array(items) if items.iter().all(|i| i.get("type").is_some()) => {
            builder.push_record(["Type", "Value"]);
            for item in items {
                builder.push_record([cell(&item["type"]), cell(&item["value"])]);
            }
        }
        Value::Object(map) => {
            builder.push_record(["Field", "Value"]);
            for (key, field) in map {
                builder.push_record([key.clone(), abbreviate(&cell(field))]);
            }
        }
        other => {
            println!("{}", pretty(other));
            return;
        }
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Shortens long values such as JWTs to their first and last characters.
pub fn abbreviate(value: &str) -> String {
    const KEEP: usize = 12;
    if value.chars().count() <= KEEP * 3 {
        return value.to_string();
    }
    let head: String = value.chars().take(KEEP).collect();
    let tail: String = value
        .chars()
        .rev()
        .take(KEEP)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short"), "short");
        let jwt = "a".repeat(20) + &"b".repeat(40) + &"c".repeat(20);
        assert_eq!(abbreviate(&jwt), "aaaaaaaaaaaa...cccccccccccc");
    }

    #[test]
    fn test_cell() {
        assert_eq!(cell(&json!("x")), "x");
        assert_eq!(cell(&json!(["a", "b"])), "a, b");
        assert_eq!(cell(&json!(3600)), "3600");
        assert_eq!(cell(&Value::Null), "-");
    }
}
