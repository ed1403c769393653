//! Record pipelines: where finished records go.
//!
//! Every record that reaches the output sink is passed through the
//! registered pipelines in order. A pipeline can hand the record on
//! (possibly changed), drop it by returning `Ok(None)`, or fail, which drops
//! it as well and is reported as an error event.

use crate::error::SpiderError;
use crate::item::Record;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn process_record(&self, record: Record) -> Result<Option<Record>, SpiderError>;

    /// Called once after the crawl has drained.
    async fn close(&self) -> Result<(), SpiderError> {
        Ok(())
    }
}

/// Logs every record. Used when no other pipeline is registered.
#[derive(Debug, Default, Clone)]
pub struct LoggingPipeline;

#[async_trait]
impl Pipeline for LoggingPipeline {
    fn name(&self) -> &str {
        "logging"
    }

    async fn process_record(&self, record: Record) -> Result<Option<Record>, SpiderError> {
        info!("Scraped {}: {}", record.schema().name(), record);
        Ok(Some(record))
    }
}
