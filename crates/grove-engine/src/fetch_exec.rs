//! Fetch execution
//!
//! Matching object ids are resolved and ordered when the request executes;
//! the objects themselves are faulted into the context one page of
//! `batch_size` at a time as iteration reaches them.

#![allow(clippy::result_large_err)]

use crate::context::Context;
use crate::object::ManagedObject;
use grove_core::errors::Result;
use grove_core::fetch::FetchRequestBuilder;
use grove_core::model::{ObjectId, ObjectSnapshot};
use std::cell::Cell;

/// Ordered results of one fetch
#[derive(Debug)]
pub struct FetchResults<'ctx> {
    context: &'ctx Context,
    ids: Vec<ObjectId>,
    /// 0 means everything was materialized at execution
    batch_size: usize,
    pages_loaded: Cell<usize>,
}

impl<'ctx> FetchResults<'ctx> {
    pub(crate) fn new(context: &'ctx Context, ids: Vec<ObjectId>, batch_size: usize) -> Self {
        Self {
            context,
            ids,
            batch_size,
            pages_loaded: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Result ids in order
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of pages faulted in lazily so far, across all iterations.
    /// Stays 0 when everything was materialized at execution.
    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded.get()
    }

    /// Iterate from the first result; each call starts over
    pub fn iter(&self) -> FetchIter<'_, 'ctx> {
        let loaded_until = if self.batch_size == 0 { self.ids.len() } else { 0 };
        FetchIter {
            results: self,
            position: 0,
            loaded_until,
        }
    }

    /// Handle for the result at `index`
    pub fn get(&self, index: usize) -> Option<ManagedObject<'ctx>> {
        self.ids
            .get(index)
            .map(|id| ManagedObject::new(self.context, id.clone()))
    }

    /// Current state of every result, in order
    pub fn snapshots(&self) -> Result<Vec<ObjectSnapshot>> {
        self.iter().map(|object| object?.snapshot()).collect()
    }

    fn page_bounds(&self, position: usize) -> (usize, usize) {
        let start = position - position % self.batch_size;
        (start, (start + self.batch_size).min(self.ids.len()))
    }
}

impl<'r, 'ctx> IntoIterator for &'r FetchResults<'ctx> {
    type Item = Result<ManagedObject<'ctx>>;
    type IntoIter = FetchIter<'r, 'ctx>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over fetch results; yields an error if faulting a page fails
pub struct FetchIter<'r, 'ctx> {
    results: &'r FetchResults<'ctx>,
    position: usize,
    loaded_until: usize,
}

impl<'ctx> Iterator for FetchIter<'_, 'ctx> {
    type Item = Result<ManagedObject<'ctx>>;

    fn next(&mut self) -> Option<Self::Item> {
        let results = self.results;
        let id = results.ids.get(self.position)?;

        if self.position >= self.loaded_until {
            let (start, end) = results.page_bounds(self.position);
            if let Err(e) = results.context.materialize(&results.ids[start..end]) {
                self.position = results.ids.len();
                return Some(Err(e));
            }
            results.pages_loaded.set(results.pages_loaded.get() + 1);
            self.loaded_until = end;
        }

        self.position += 1;
        Some(Ok(ManagedObject::new(results.context, id.clone())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.results.ids.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

/// Seal and execute a request in one step
pub trait FetchRequestBuilderExt {
    /// # Errors
    /// Any build error, or a fetch error from the context.
    fn execute(self, context: &Context) -> Result<FetchResults<'_>>;
}

impl FetchRequestBuilderExt for FetchRequestBuilder {
    fn execute(self, context: &Context) -> Result<FetchResults<'_>> {
        let request = self.build()?;
        context.fetch(&request)
    }
}
