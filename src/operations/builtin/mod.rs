pub mod documents;
pub mod email;
pub mod files;
pub mod git;
pub mod http;
pub mod sql;
pub mod tabular;

pub use documents::{ConvertMarkdownOperation, DocsIndexOperation, TranscribeAudioOperation};
pub use email::EmailSenderOperation;
pub use files::{CountWeekdayOperation, RecentLogsOperation};
pub use git::CloneRepoOperation;
pub use http::{FetchDataOperation, HttpFetcher, ScrapeFormat, ScrapeWebsiteOperation};
pub use sql::{SqlQueryOperation, TicketSalesOperation};
pub use tabular::{FilterCsvOperation, SortContactsOperation};

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::OperationsConfig;
use crate::llm::LlmClient;
use crate::operations::OperationRegistry;

/// Writes `contents` to an already-validated path, creating parent directories.
pub(crate) async fn write_output(path: &str, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Serializes with four-space indentation.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Registers every builtin operation. Order here is routing priority.
///
/// `llm` is shared with operations that need the model; `None` leaves them
/// registered but failing with `ModelUnavailable`.
pub fn register_all(
    registry: &mut OperationRegistry,
    config: &OperationsConfig,
    llm: Option<Arc<dyn LlmClient>>,
) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new();

    registry.register(Box::new(FetchDataOperation::new(
        fetcher.clone(),
        &config.fetch_url,
        &config.fetch_output,
    )));
    registry.register(Box::new(CloneRepoOperation::new(
        &config.clone_url,
        &config.clone_dest,
    )));
    registry.register(Box::new(SqlQueryOperation::new(
        &config.sql_db,
        &config.sql_query,
        &config.sql_output,
    )));
    registry.register(Box::new(ScrapeWebsiteOperation::new(
        fetcher,
        &config.scrape_url,
        &config.scrape_output,
        ScrapeFormat::parse(&config.scrape_format)?,
    )));
    registry.register(Box::new(TranscribeAudioOperation::new(
        &config.audio_input,
        &config.audio_output,
    )));
    registry.register(Box::new(ConvertMarkdownOperation::new(
        &config.markdown_input,
        &config.markdown_output,
    )));
    registry.register(Box::new(FilterCsvOperation::new(
        &config.csv_input,
        &config.csv_output,
        &config.csv_condition,
    )));
    registry.register(Box::new(CountWeekdayOperation::new(
        &config.dates_input,
        &config.dates_output,
        &config.weekday,
    )?));
    registry.register(Box::new(SortContactsOperation::new(
        &config.contacts_input,
        &config.contacts_output,
    )));
    registry.register(Box::new(RecentLogsOperation::new(
        &config.logs_dir,
        &config.logs_output,
        config.logs_count,
    )));
    registry.register(Box::new(TicketSalesOperation::new(
        &config.tickets_db,
        &config.tickets_type,
        &config.tickets_output,
    )));
    registry.register(Box::new(DocsIndexOperation::new(
        &config.docs_dir,
        &config.docs_index_output,
    )));
    registry.register(Box::new(EmailSenderOperation::new(
        llm,
        &config.email_input,
        &config.email_output,
    )));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin_registry() -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        register_all(&mut registry, &OperationsConfig::default(), None).unwrap();
        registry
    }

    #[test]
    fn test_register_all_order() {
        let keywords: Vec<String> = builtin_registry()
            .descriptors()
            .into_iter()
            .map(|d| d.keyword)
            .collect();
        assert_eq!(
            keywords,
            vec![
                "fetch data",
                "clone repo",
                "SQL query",
                "scrape website",
                "transcribe audio",
                "convert markdown",
                "filter CSV",
                "count Wednesdays",
                "sort contacts",
                "recent logs",
                "ticket sales",
                "index docs",
                "email sender",
            ]
        );
    }

    #[test]
    fn test_each_keyword_routes_to_its_operation() {
        let registry = builtin_registry();
        for descriptor in registry.descriptors() {
            let task = format!("please {} for me", descriptor.keyword);
            assert_eq!(registry.dispatch(&task).unwrap().name(), descriptor.name);
        }
    }

    #[test]
    fn test_register_all_rejects_bad_scrape_format() {
        let config = OperationsConfig {
            scrape_format: "pdf".to_string(),
            ..OperationsConfig::default()
        };
        assert!(register_all(&mut OperationRegistry::new(), &config, None).is_err());
    }

    #[tokio::test]
    async fn test_write_output_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.txt");
        write_output(path.to_str().unwrap(), b"content").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "content");
    }
}
