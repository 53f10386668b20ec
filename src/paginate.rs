//! Fault-tolerant pagination over a Crossref component.
//!
//! [`Paginator::paginate`] returns a lazy [`Stream`] of records. Pages are
//! fetched strictly one after another, either by cursor (when a non-empty
//! starting cursor is given) or by offset from 0.
//!
//! Transport failures, non-200 statuses and unparseable bodies are retried
//! at the same position after sleeping `2^n` backoff units, with the page
//! size cut to 75% per consecutive failure. A 200 whose payload status is not
//! `"ok"` is retried immediately with identical parameters. Any good page
//! restores the full batch size.

use crate::client::{ApiClient, DEFAULT_TIMEOUT};
use crate::error::{CrossrefError, OptionExt, Result};
use crate::progress::{no_progress, ProgressFactory, ProgressReporter};
use async_stream::try_stream;
use futures::Stream;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A single item from a Crossref listing
pub type Record = serde_json::Value;

/// Default component
pub const DEFAULT_COMPONENT: &str = "works";

/// Default page size
pub const DEFAULT_BATCH_SIZE: u32 = 20;

/// Query keys managed by the paginator itself
const RESERVED_PARAMS: &[&str] = &["rows", "offset", "cursor"];

/// Bounds on consecutive failures before a run gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive retries allowed after a failure; `None` retries forever
    pub max_retries: Option<u32>,
    /// Ceiling on a single backoff sleep
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(10),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Retry forever with uncapped exponential backoff
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            max_delay: None,
        }
    }

    /// Fail once `streak` consecutive failures exceed the policy
    fn check(&self, streak: u32, last_error: CrossrefError) -> Result<()> {
        if self.max_retries.is_some_and(|max| streak > max) {
            return Err(CrossrefError::RetryExhausted {
                attempts: streak,
                last_error: Box::new(last_error),
            });
        }
        Ok(())
    }
}

/// Where the next page starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Opaque server-issued token
    Cursor(String),
    /// Number of records to skip
    Offset(u64),
}

/// Options for a single pagination run
#[derive(Clone)]
pub struct PaginateOptions {
    pub component: String,
    pub batch_size: u32,
    pub cursor: Option<String>,
    pub max_items: Option<u64>,
    pub timeout: Duration,
    /// Extra query-string parameters sent with every page
    pub params: Vec<(String, String)>,
    pub retry: RetryPolicy,
    /// Backoff after the n-th consecutive failure is `backoff_unit * 2^n`
    pub backoff_unit: Duration,
    pub progress: ProgressFactory,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            component: DEFAULT_COMPONENT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            cursor: None,
            max_items: None,
            timeout: DEFAULT_TIMEOUT,
            params: Vec::new(),
            retry: RetryPolicy::default(),
            backoff_unit: Duration::from_secs(1),
            progress: no_progress(),
        }
    }
}

impl std::fmt::Debug for PaginateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginateOptions")
            .field("component", &self.component)
            .field("batch_size", &self.batch_size)
            .field("cursor", &self.cursor)
            .field("max_items", &self.max_items)
            .field("timeout", &self.timeout)
            .field("params", &self.params)
            .field("retry", &self.retry)
            .field("backoff_unit", &self.backoff_unit)
            .finish_non_exhaustive()
    }
}

impl PaginateOptions {
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Paginate by cursor. Use `"*"` to start from scratch.
    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a query parameter such as `filter` or `select`
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[must_use]
    pub fn progress(mut self, factory: ProgressFactory) -> Self {
        self.progress = factory;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CrossrefError::Config("batch_size must be at least 1".into()));
        }
        if let Some((key, _)) = self
            .params
            .iter()
            .find(|(key, _)| RESERVED_PARAMS.contains(&key.as_str()))
        {
            return Err(CrossrefError::Config(format!(
                "query parameter {:?} is managed by the paginator",
                key
            )));
        }
        Ok(())
    }
}

/// Mutable bookkeeping for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageState {
    batch_size: u32,
    rows: u32,
    position: Position,
    successive_errors: u32,
    not_ok_streak: u32,
    total: Option<u64>,
    emitted: u64,
}

impl PageState {
    /// A non-empty cursor selects cursor mode for the whole run.
    pub(crate) fn new(batch_size: u32, cursor: Option<&str>) -> Self {
        let position = match cursor {
            Some(cursor) if !cursor.is_empty() => Position::Cursor(cursor.to_string()),
            _ => Position::Offset(0),
        };
        Self {
            batch_size,
            rows: batch_size,
            position,
            successive_errors: 0,
            not_ok_streak: 0,
            total: None,
            emitted: 0,
        }
    }

    pub(crate) fn params(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(extra.len() + 2);
        match &self.position {
            Position::Cursor(cursor) => params.push(("cursor".to_string(), cursor.clone())),
            Position::Offset(offset) => params.push(("offset".to_string(), offset.to_string())),
        }
        params.push(("rows".to_string(), self.rows.to_string()));
        params.extend(extra.iter().cloned());
        params
    }

    /// Count a transport/HTTP failure and shrink the next page. Returns the streak.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.successive_errors += 1;
        self.rows = (self.rows.saturating_mul(3) / 4).max(1);
        self.successive_errors
    }

    pub(crate) fn backoff(&self, unit: Duration, max_delay: Option<Duration>) -> Duration {
        let delay = unit.saturating_mul(2u32.saturating_pow(self.successive_errors));
        match max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub(crate) fn record_not_ok(&mut self) -> u32 {
        self.not_ok_streak += 1;
        self.not_ok_streak
    }

    pub(crate) fn record_success(&mut self) {
        self.successive_errors = 0;
        self.not_ok_streak = 0;
        self.rows = self.batch_size;
    }

    /// Set the total from the first good page. Returns it only the first time.
    pub(crate) fn init_total(&mut self, reported: u64, max_items: Option<u64>) -> Option<u64> {
        if self.total.is_some() {
            return None;
        }
        let total = max_items.map_or(reported, |max| reported.min(max));
        self.total = Some(total);
        Some(total)
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.total.unwrap_or(0).saturating_sub(self.emitted)
    }

    /// Offset mode only: the page must start where it was asked to.
    pub(crate) fn check_start_index(&self, start_index: Option<u64>) -> Result<()> {
        match (&self.position, start_index) {
            (Position::Offset(offset), Some(actual)) if *offset != actual => {
                Err(CrossrefError::PaginationConsistency {
                    expected: *offset,
                    actual,
                })
            }
            _ => Ok(()),
        }
    }

    /// Move past `taken` emitted records.
    pub(crate) fn advance(&mut self, taken: u64, next_cursor: Option<String>) -> Result<()> {
        self.emitted += taken;
        match &mut self.position {
            Position::Offset(offset) => *offset += taken,
            Position::Cursor(cursor) => {
                if taken > 0 {
                    *cursor = next_cursor
                        .filter(|c| !c.is_empty())
                        .ok_or_parse("page is missing next-cursor")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PageMessage {
    #[serde(rename = "total-results")]
    total_results: u64,
    #[serde(default)]
    items: Vec<Record>,
    #[serde(rename = "next-cursor", default)]
    next_cursor: Option<String>,
    #[serde(default)]
    query: Option<PageQuery>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(rename = "start-index", default)]
    start_index: Option<u64>,
}

/// Issue one request and classify the outcome
async fn fetch_page<C>(
    client: &C,
    options: &PaginateOptions,
    params: &[(String, String)],
) -> Result<PageMessage>
where
    C: ApiClient + ?Sized,
{
    let response = client.query(&options.component, options.timeout, params).await?;

    if !response.is_ok() {
        return Err(CrossrefError::HttpStatus {
            status: response.status,
            url: response.url,
            body: response.body,
        });
    }

    let envelope: Envelope = serde_json::from_str(&response.body)?;
    if envelope.status.as_deref() != Some("ok") {
        return Err(CrossrefError::NotOk {
            status: envelope.status.unwrap_or_default(),
            url: response.url,
            payload: response.body,
        });
    }

    serde_json::from_value(envelope.message)
        .map_err(|e| CrossrefError::Parse(format!("unexpected message from {}: {}", response.url, e)))
}

/// Drives repeated queries against one API client
#[derive(Debug)]
pub struct Paginator<C: ?Sized> {
    client: Arc<C>,
}

impl<C: ?Sized> Clone for Paginator<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C> Paginator<C>
where
    C: ApiClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Stream every record of `options.component`.
    ///
    /// Each call starts from scratch. The stream ends after the first page
    /// that contributes no records, or with the first fatal error.
    pub fn paginate(&self, options: PaginateOptions) -> impl Stream<Item = Result<Record>> + Send {
        let client = Arc::clone(&self.client);

        try_stream! {
            options.validate()?;

            let mut state = PageState::new(options.batch_size, options.cursor.as_deref());
            let mut progress: Option<Box<dyn ProgressReporter>> = None;

            loop {
                let params = state.params(&options.params);

                let page = match fetch_page(client.as_ref(), &options, &params).await {
                    Ok(page) => page,
                    Err(CrossrefError::NotOk { status, url, payload }) => {
                        warn!(url = %url, payload = %payload, "Payload status is not ok, retrying");
                        let streak = state.record_not_ok();
                        options
                            .retry
                            .check(streak, CrossrefError::NotOk { status, url, payload })?;
                        continue;
                    }
                    Err(e) if e.is_recoverable() => {
                        let successive_errors = state.record_failure();
                        warn!(
                            successive_errors,
                            params = ?params,
                            error = %e,
                            "Successive error"
                        );
                        options.retry.check(successive_errors, e)?;
                        let delay = state.backoff(options.backoff_unit, options.retry.max_delay);
                        debug!(delay = ?delay, rows = state.rows, "Backing off");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Err(e) => Err(e)?,
                };

                state.record_success();

                if let Some(total) = state.init_total(page.total_results, options.max_items) {
                    let mut reporter = (options.progress)(&options.component);
                    reporter.set_total(total);
                    progress = Some(reporter);
                }

                state
                    .check_start_index(page.query.and_then(|q| q.start_index))
                    .inspect_err(|e| error!(error = %e, params = ?params, "Upstream skipped or repeated records"))?;

                let remaining = usize::try_from(state.remaining()).unwrap_or(usize::MAX);
                let items: Vec<Record> = page.items.into_iter().take(remaining).collect();
                let taken = items.len() as u64;

                for item in items {
                    yield item;
                }

                state.advance(taken, page.next_cursor)?;
                if let Some(reporter) = progress.as_mut() {
                    reporter.advance(taken);
                }

                match &state.position {
                    Position::Cursor(cursor) => {
                        info!(emitted = state.emitted, cursor = %cursor, "Cursor updated");
                    }
                    Position::Offset(offset) => {
                        info!(emitted = state.emitted, offset, "Offset updated");
                    }
                }

                if taken == 0 {
                    if let Some(reporter) = progress.as_mut() {
                        reporter.finish();
                    }
                    break;
                }
            }
        }
    }
}

/// Convenience for [`Paginator::paginate`]
pub fn paginate<C>(client: Arc<C>, options: PaginateOptions) -> impl Stream<Item = Result<Record>> + Send
where
    C: ApiClient + ?Sized + 'static,
{
    Paginator::new(client).paginate(options)
}
