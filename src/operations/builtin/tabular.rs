//! Builtin operations over tabular data: CSV filtering and contact sorting.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use super::{to_pretty_json, write_output};
use crate::operations::{Operation, OperationContext};

/// An equality condition on one CSV column, written `column=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvCondition {
    pub column: String,
    pub value: String,
}

impl CsvCondition {
    pub fn parse(condition: &str) -> anyhow::Result<Self> {
        let (column, value) = condition
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid CSV condition '{condition}' (expected column=value)"))?;
        let column = column.trim();
        if column.is_empty() {
            bail!("invalid CSV condition '{condition}': empty column name");
        }
        Ok(Self {
            column: column.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Keeps the rows of `data` matching `condition`, as JSON objects keyed by header.
///
/// Quoted fields may contain commas. Short rows are padded with empty strings.
pub fn filter_rows(data: &str, condition: &CsvCondition) -> anyhow::Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes());

    let header = reader.headers().context("Cannot read CSV header")?.clone();
    if header.is_empty() {
        bail!("CSV input is empty");
    }

    let index = header
        .iter()
        .position(|h| h == condition.column)
        .ok_or_else(|| anyhow!("CSV has no column '{}'", condition.column))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("Malformed CSV row")?;
        if record.get(index).unwrap_or("") != condition.value {
            continue;
        }
        let object: Map<String, Value> = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let field = record.get(i).unwrap_or("");
                (name.to_string(), Value::String(field.to_string()))
            })
            .collect();
        rows.push(Value::Object(object));
    }
    Ok(rows)
}

// ── filter_csv ───────────────────────────────────────────

pub struct FilterCsvOperation {
    input: String,
    output: String,
    condition: String,
}

impl FilterCsvOperation {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            condition: condition.into(),
        }
    }
}

#[async_trait]
impl Operation for FilterCsvOperation {
    fn name(&self) -> &str {
        "filter_csv"
    }

    fn keyword(&self) -> &str {
        "filter CSV"
    }

    fn description(&self) -> &str {
        "Filter the configured CSV file by a column=value condition and save matching rows as JSON."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        let condition = CsvCondition::parse(&self.condition)?;
        let data = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Cannot read {}", self.input))?;
        let rows = filter_rows(&data, &condition)?;
        write_output(&self.output, &serde_json::to_vec(&rows)?).await?;

        info!("Filtered {} rows from {} into {}", rows.len(), self.input, self.output);
        Ok("CSV filtered successfully.".to_string())
    }
}

// ── sort_contacts ────────────────────────────────────────

/// Sorts contacts by `last_name`, then `first_name`. Missing names sort first.
pub fn sort_contacts(contacts: &mut [Value]) {
    fn key(contact: &Value) -> (String, String) {
        let field = |name: &str| contact[name].as_str().unwrap_or("").to_string();
        (field("last_name"), field("first_name"))
    }
    contacts.sort_by_key(key);
}

pub struct SortContactsOperation {
    input: String,
    output: String,
}

impl SortContactsOperation {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for SortContactsOperation {
    fn name(&self) -> &str {
        "sort_contacts"
    }

    fn keyword(&self) -> &str {
        "sort contacts"
    }

    fn description(&self) -> &str {
        "Sort the contacts JSON array by last name, then first name."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        let raw = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Cannot read {}", self.input))?;
        let mut contacts: Vec<Value> =
            serde_json::from_str(&raw).context("Contacts file is not a JSON array")?;

        sort_contacts(&mut contacts);
        write_output(&self.output, &to_pretty_json(&contacts)?).await?;

        Ok("Contacts sorted.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sandbox_in;
    use serde_json::json;

    const CSV: &str = "name,status,city\nalice,active,Paris\nbob,inactive,Lyon\ncarol,active,Nice\n";

    #[test]
    fn test_condition_parse() {
        let cond = CsvCondition::parse("status = active").unwrap();
        assert_eq!(cond.column, "status");
        assert_eq!(cond.value, "active");
        assert!(CsvCondition::parse("no equals sign").is_err());
        assert!(CsvCondition::parse("=value").is_err());
    }

    #[test]
    fn test_filter_rows_matches() {
        let rows = filter_rows(CSV, &CsvCondition::parse("status=active").unwrap()).unwrap();
        assert_eq!(
            rows,
            vec![
                json!({"name": "alice", "status": "active", "city": "Paris"}),
                json!({"name": "carol", "status": "active", "city": "Nice"}),
            ]
        );
    }

    #[test]
    fn test_filter_rows_no_match_is_empty() {
        let rows = filter_rows(CSV, &CsvCondition::parse("city=Berlin").unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_filter_rows_unknown_column() {
        let err = filter_rows(CSV, &CsvCondition::parse("age=3").unwrap()).unwrap_err();
        assert!(err.to_string().contains("no column 'age'"));
    }

    #[test]
    fn test_filter_rows_short_line() {
        let csv = "a,b\n1\n2,x\n";
        let rows = filter_rows(csv, &CsvCondition::parse("b=").unwrap()).unwrap();
        assert_eq!(rows, vec![json!({"a": "1", "b": ""})]);
    }

    #[test]
    fn test_filter_rows_quoted_comma() {
        let csv = "name,status\n\"Smith, John\",active\n";
        let rows = filter_rows(csv, &CsvCondition::parse("status=active").unwrap()).unwrap();
        assert_eq!(rows, vec![json!({"name": "Smith, John", "status": "active"})]);
    }

    #[test]
    fn test_filter_rows_empty_input() {
        assert!(filter_rows("", &CsvCondition::parse("a=b").unwrap()).is_err());
    }

    #[test]
    fn test_sort_contacts_by_last_then_first() {
        let mut contacts = vec![
            json!({"first_name": "Zoe", "last_name": "Adams"}),
            json!({"first_name": "Bob", "last_name": "Zimmer"}),
            json!({"first_name": "Amy", "last_name": "Adams"}),
            json!({"first_name": "Nobody"}),
        ];
        sort_contacts(&mut contacts);
        let firsts: Vec<&str> = contacts
            .iter()
            .map(|c| c["first_name"].as_str().unwrap())
            .collect();
        assert_eq!(firsts, vec!["Nobody", "Amy", "Zoe", "Bob"]);
    }

    #[tokio::test]
    async fn test_filter_csv_operation() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let input = format!("{}/input.csv", dir.path().display());
        let output = format!("{}/output.json", dir.path().display());
        std::fs::write(&input, CSV).unwrap();

        let op = FilterCsvOperation::new(&input, &output, "city=Lyon");
        let context = OperationContext { sandbox: &sandbox, task: "filter CSV" };
        assert_eq!(op.execute(&context).await.unwrap(), "CSV filtered successfully.");

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, json!([{"name": "bob", "status": "inactive", "city": "Lyon"}]));
    }

    #[tokio::test]
    async fn test_sort_contacts_operation() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let input = format!("{}/contacts.json", dir.path().display());
        let output = format!("{}/contacts-sorted.json", dir.path().display());
        std::fs::write(
            &input,
            r#"[{"first_name":"B","last_name":"Y"},{"first_name":"A","last_name":"X"}]"#,
        )
        .unwrap();

        let op = SortContactsOperation::new(&input, &output);
        let context = OperationContext { sandbox: &sandbox, task: "sort contacts" };
        assert_eq!(op.execute(&context).await.unwrap(), "Contacts sorted.");

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("\n    {"));
        let sorted: Vec<Value> = serde_json::from_str(&written).unwrap();
        assert_eq!(sorted[0]["last_name"], "X");
    }

    #[tokio::test]
    async fn test_sort_contacts_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_in(dir.path());
        let input = format!("{}/contacts.json", dir.path().display());
        let output = format!("{}/contacts-sorted.json", dir.path().display());
        std::fs::write(&input, "{not json").unwrap();

        let op = SortContactsOperation::new(&input, &output);
        let context = OperationContext { sandbox: &sandbox, task: "sort contacts" };
        assert!(op.execute(&context).await.is_err());
    }
}
