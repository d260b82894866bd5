//! Fetch requests
//!
//! A [`FetchRequestBuilder`] collects the entity, predicate, ordering and
//! paging options; [`FetchRequestBuilder::build`] validates everything
//! against the model schema and seals an immutable [`FetchRequest`].
//! Mistakes surface at build time, never at execution.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::{ModelSchema, ObjectId, ObjectSnapshot, Value};
use crate::predicate::Predicate;
use std::cmp::Ordering;
use std::sync::Arc;

const OP_BUILD: &str = "build_fetch_request";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: false,
        }
    }
}

/// Sealed, immutable fetch request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    entity: String,
    predicate: Predicate,
    sort: Vec<SortDescriptor>,
    fetch_limit: Option<usize>,
    fetch_offset: usize,
    batch_size: Option<usize>,
}

impl FetchRequest {
    pub fn builder(schema: Arc<ModelSchema>, entity: impl Into<String>) -> FetchRequestBuilder {
        FetchRequestBuilder::new(schema, entity)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn sort_descriptors(&self) -> &[SortDescriptor] {
        &self.sort
    }

    pub fn fetch_limit(&self) -> Option<usize> {
        self.fetch_limit
    }

    pub fn fetch_offset(&self) -> usize {
        self.fetch_offset
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn matches(&self, snapshot: &ObjectSnapshot) -> bool {
        snapshot.entity() == self.entity && self.predicate.evaluate(snapshot)
    }

    /// Result order: sort descriptors in turn, then object id
    pub fn order(&self, a: &ObjectSnapshot, b: &ObjectSnapshot) -> Ordering {
        for descriptor in &self.sort {
            let ord = a
                .attribute(&descriptor.key)
                .sort_cmp(b.attribute(&descriptor.key));
            let ord = if descriptor.ascending {
                ord
            } else {
                ord.reverse()
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Filter, order and page `candidates`, returning the selected ids
    pub fn select<'a>(&self, candidates: impl IntoIterator<Item = &'a ObjectSnapshot>) -> Vec<ObjectId> {
        let mut matching: Vec<&ObjectSnapshot> =
            candidates.into_iter().filter(|s| self.matches(s)).collect();
        matching.sort_by(|a, b| self.order(a, b));
        matching
            .into_iter()
            .skip(self.fetch_offset)
            .take(self.fetch_limit.unwrap_or(usize::MAX))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Number of rows `select` would return
    pub fn count<'a>(&self, candidates: impl IntoIterator<Item = &'a ObjectSnapshot>) -> usize {
        let total = candidates.into_iter().filter(|s| self.matches(s)).count();
        let after_offset = total.saturating_sub(self.fetch_offset);
        self.fetch_limit
            .map_or(after_offset, |limit| after_offset.min(limit))
    }
}

/// Collects fetch options; see the module docs
#[derive(Debug, Clone)]
pub struct FetchRequestBuilder {
    schema: Arc<ModelSchema>,
    entity: String,
    predicate: Option<Predicate>,
    sort: Vec<SortDescriptor>,
    fetch_limit: Option<usize>,
    fetch_offset: usize,
    batch_size: Option<usize>,
    error: Option<ExError>,
}

impl FetchRequestBuilder {
    pub fn new(schema: Arc<ModelSchema>, entity: impl Into<String>) -> Self {
        Self {
            schema,
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            fetch_limit: None,
            fetch_offset: 0,
            batch_size: None,
            error: None,
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Filter with a predicate format string
    #[must_use]
    pub fn predicate(self, format: &str) -> Self {
        self.predicate_with_args(format, &[])
    }

    /// Filter with a format string whose `%@` placeholders take `args`
    #[must_use]
    pub fn predicate_with_args(mut self, format: &str, args: &[Value]) -> Self {
        match Predicate::parse_with_args(format, args) {
            Ok(p) => self.predicate = Some(p),
            Err(e) => self.record(ExError::from(e).with_op(OP_BUILD)),
        }
        self
    }

    /// Filter with an already constructed predicate
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn sort_by(mut self, key: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortDescriptor {
            key: key.into(),
            ascending,
        });
        self
    }

    /// Maximum rows returned; 0 means no limit
    #[must_use]
    pub fn fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = (limit > 0).then_some(limit);
        self
    }

    #[must_use]
    pub fn fetch_offset(mut self, offset: usize) -> Self {
        self.fetch_offset = offset;
        self
    }

    /// Rows materialized per page; 0 materializes all at once
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    fn record(&mut self, err: ExError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Validate and seal the request
    ///
    /// # Errors
    /// - `Parameter` for an unknown entity or sort key
    /// - `InvalidPredicate` for a malformed predicate, unknown key path or
    ///   literal of the wrong kind
    pub fn build(self) -> Result<FetchRequest> {
        let entity = self.schema.entity(&self.entity).ok_or_else(|| {
            ExError::new(ExErrorKind::Parameter)
                .with_op(OP_BUILD)
                .with_entity(&self.entity)
                .with_message(format!(
                    "Entity '{}' is not part of model '{}'",
                    self.entity, self.schema.name
                ))
        })?;

        if let Some(err) = self.error {
            return Err(err.with_entity(&self.entity));
        }

        for descriptor in &self.sort {
            if entity.attribute_named(&descriptor.key).is_none() {
                return Err(ExError::new(ExErrorKind::Parameter)
                    .with_op(OP_BUILD)
                    .with_entity(&self.entity)
                    .with_attribute(&descriptor.key)
                    .with_message(format!(
                        "Sort key '{}' is not an attribute of '{}'",
                        descriptor.key, self.entity
                    )));
            }
        }

        let predicate = match self.predicate {
            Some(p) => p
                .bind(entity)
                .map_err(|e| ExError::from(e).with_op(OP_BUILD).with_entity(&self.entity))?,
            None => Predicate::True,
        };

        Ok(FetchRequest {
            entity: self.entity,
            predicate,
            sort: self.sort,
            fetch_limit: self.fetch_limit,
            fetch_offset: self.fetch_offset,
            batch_size: self.batch_size,
        })
    }
}
