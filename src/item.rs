//! # Item Module
//!
//! Structured outputs produced by callbacks.
//!
//! A [`Record`] is a key/value object constrained by a [`RecordSchema`]: the
//! set of legal keys is fixed when the schema is declared, and reading or
//! writing any other key fails immediately with
//! [`SpiderError::UndeclaredField`] without touching stored values. Values
//! are only reachable through keyed access (`get`/`set`), never as fields of
//! the record itself, so a declared field and its current value cannot be
//! confused.
//!
//! Callbacks yield [`Output`]s, either a follow-up [`Request`] or a
//! [`Record`], as a lazy [`Outputs`] stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::item::{Output, RecordSchema};
//!
//! const ARTICLE: RecordSchema = RecordSchema::new("Article", &["title", "url"]);
//!
//! let mut article = ARTICLE.record();
//! article.set("title", "Hello")?;
//! assert!(article.set("author", "nobody").is_err());
//! let output = Output::from(article);
//! ```

use crate::error::SpiderError;
use crate::request::Request;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

/// A lazy, finite sequence of outputs produced by a callback.
pub type Outputs = BoxStream<'static, Result<Output, SpiderError>>;

/// The declared field set of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    name: &'static str,
    fields: &'static [&'static str],
}

impl RecordSchema {
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        RecordSchema { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Creates an empty record of this schema.
    pub fn record(&self) -> Record {
        Record {
            schema: *self,
            values: BTreeMap::new(),
        }
    }
}

/// A schema-constrained structured output.
#[derive(Clone, PartialEq)]
pub struct Record {
    schema: RecordSchema,
    values: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    fn declared(&self, field: &str) -> Result<&'static str, SpiderError> {
        self.schema
            .fields
            .iter()
            .copied()
            .find(|f| *f == field)
            .ok_or_else(|| SpiderError::UndeclaredField {
                record: self.schema.name.to_string(),
                field: field.to_string(),
            })
    }

    /// Sets a declared field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), SpiderError> {
        let key = self.declared(field)?;
        self.values.insert(key, value.into());
        Ok(())
    }

    /// Builder-style variant of [`Record::set`].
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self, SpiderError> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Reads a declared field. `Ok(None)` means the field is declared but unset.
    pub fn get(&self, field: &str) -> Result<Option<&Value>, SpiderError> {
        let key = self.declared(field)?;
        Ok(self.values.get(key))
    }

    /// Clears a declared field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Result<Option<Value>, SpiderError> {
        let key = self.declared(field)?;
        Ok(self.values.remove(key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the fields that currently hold a value.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// The set values as a JSON object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.schema.name, self.to_json())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// What a callback may yield.
#[derive(Debug, Clone)]
pub enum Output {
    Request(Request),
    Record(Record),
}

impl From<Request> for Output {
    fn from(request: Request) -> Self {
        Output::Request(request)
    }
}

impl From<Record> for Output {
    fn from(record: Record) -> Self {
        Output::Record(record)
    }
}

/// An empty output sequence.
pub fn no_outputs() -> Outputs {
    stream::empty().boxed()
}

/// Wraps already computed outputs as a stream.
pub fn outputs_from<I, O>(outputs: I) -> Outputs
where
    I: IntoIterator<Item = O>,
    I::IntoIter: Send + 'static,
    O: Into<Output>,
{
    stream::iter(outputs.into_iter().map(|o| Ok(o.into()))).boxed()
}

/// Turns an async computation of outputs into a stream. An error becomes
/// the stream's only item.
pub fn outputs_async<F>(future: F) -> Outputs
where
    F: Future<Output = Result<Vec<Output>, SpiderError>> + Send + 'static,
{
    stream::once(future)
        .map_ok(|outputs| stream::iter(outputs.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: RecordSchema = RecordSchema::new("Article", &["title", "url"]);

    #[test]
    fn declared_fields_round_trip() {
        let mut article = ARTICLE.record();
        article.set("title", "Hello").unwrap();
        assert_eq!(article.get("title").unwrap(), Some(&Value::from("Hello")));
        assert_eq!(article.get("url").unwrap(), None);
        assert_eq!(article.len(), 1);
    }

    #[test]
    fn undeclared_field_fails_without_mutation() {
        let mut article = ARTICLE.record().with("url", "https://example.com").unwrap();
        let before = article.clone();

        let err = article.set("author", "someone").unwrap_err();
        assert!(matches!(
            err,
            SpiderError::UndeclaredField { ref record, ref field } if record == "Article" && field == "author"
        ));
        assert_eq!(article, before);
        assert!(article.get("author").is_err());
        assert!(article.remove("author").is_err());
    }

    #[test]
    fn to_json_contains_only_set_fields() {
        let article = ARTICLE
            .record()
            .with("title", "T")
            .unwrap()
            .with("url", "U")
            .unwrap();
        assert_eq!(
            article.to_json(),
            serde_json::json!({"title": "T", "url": "U"})
        );
        assert_eq!(article.to_string(), r#"{"title":"T","url":"U"}"#);
    }

    #[tokio::test]
    async fn outputs_from_preserves_order() {
        let first = Request::get("https://example.com/1").unwrap();
        let outputs = outputs_from(vec![
            Output::from(first.clone()),
            Output::from(ARTICLE.record()),
        ]);
        let collected: Vec<Output> = outputs.try_collect().await.unwrap();
        assert_eq!(collected.len(), 2);
        assert!(matches!(&collected[0], Output::Request(r) if *r == first));
        assert!(matches!(&collected[1], Output::Record(_)));
    }

    #[tokio::test]
    async fn outputs_async_flattens_or_fails() {
        let ok = outputs_async(async { Ok(vec![Output::from(ARTICLE.record())]) });
        assert_eq!(ok.collect::<Vec<_>>().await.len(), 1);

        let failed = outputs_async(async { Err(SpiderError::InvalidOutput("bad".into())) });
        let items: Vec<_> = failed.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SpiderError::InvalidOutput(_))));
    }
}
