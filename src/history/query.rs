// Lazy, restartable history queries.
//
// Nothing is read until a page is asked for. Pages are fetched with a
// keyset cursor on (recorded_at, seq), so records appended while a query
// is being walked never shift earlier pages, and restarting from the top
// reproduces the same sequence plus whatever was added since.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::db::models::{HistoryCursor, HistoryFilter, ScoringRecord};
use crate::db::Database;
use crate::error::Result;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

pub struct HistoryQuery {
    db: Arc<dyn Database>,
    filter: HistoryFilter,
    page_size: u32,
    cursor: Option<HistoryCursor>,
    exhausted: bool,
}

impl HistoryQuery {
    pub fn new(db: Arc<dyn Database>, filter: HistoryFilter) -> Self {
        Self {
            db,
            filter,
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn filter(&self) -> &HistoryFilter {
        &self.filter
    }

    /// The next page of records, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ScoringRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        let rows = self
            .db
            .query_records(&self.filter, self.cursor.as_ref(), self.page_size)
            .await?;

        if rows.len() < self.page_size as usize {
            self.exhausted = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(rows.len());
        for (cursor, record) in rows {
            self.cursor = Some(cursor);
            records.push(record);
        }
        Ok(Some(records))
    }

    /// Start again from the first record.
    pub fn restart(&mut self) {
        self.cursor = None;
        self.exhausted = false;
    }

    /// Every matching record, from the top.
    pub async fn collect_all(&mut self) -> Result<Vec<ScoringRecord>> {
        self.restart();
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }

    /// At most `limit` matching records, from the top.
    pub async fn take(&mut self, limit: usize) -> Result<Vec<ScoringRecord>> {
        self.restart();
        let mut taken = Vec::new();
        while taken.len() < limit {
            match self.next_page().await? {
                Some(page) => taken.extend(page),
                None => break,
            }
        }
        taken.truncate(limit);
        Ok(taken)
    }

    /// Records one at a time, fetching pages as the stream is polled.
    /// A storage error ends the stream after it is yielded.
    pub fn into_stream(self) -> impl Stream<Item = Result<ScoringRecord>> {
        stream::unfold(
            (self, VecDeque::new(), false),
            |(mut query, mut buffer, failed)| async move {
                if failed {
                    return None;
                }
                if buffer.is_empty() {
                    match query.next_page().await {
                        Ok(Some(page)) => buffer.extend(page),
                        Ok(None) => return None,
                        Err(e) => return Some((Err(e), (query, buffer, true))),
                    }
                }
                let record = buffer.pop_front()?;
                Some((Ok(record), (query, buffer, false)))
            },
        )
    }
}
