//! # Reconciliation Driver
//!
//! Walks roster records one at a time, matches each unlinked record to an
//! identity, rewrites the identity's handle to the canonical form, and sets
//! the record's linkage field. Processing is strictly sequential: record N+1
//! starts only after record N's updates have been awaited.
//!
//! Per-record failures are collected in the [`ReconcileSummary`]; only a
//! failure to obtain the credential snapshot or the roster listing aborts
//! the run.

use crate::config::{RosterConfig, DEFAULT_TOP_DOMAINS};
use crate::error::{ReconcileError, RecordIssue, StoreError, UpdateStage};
use crate::index::{HandleIndex, HandleLookup};
use crate::matcher::{Match, MatchResult, Matcher};
use crate::model::{IdentityId, IdentityUpdate, RecordUpdate, RosterRecord};
use crate::normalize::canonical_handle;
use crate::store::{list_all_identities, CredentialStore, DocumentStore};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Knobs for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub collection: String,
    pub page_size: usize,
    pub canonical_domain: String,
    pub detect_ambiguity: bool,
    pub repair_linked_handles: bool,
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&RosterConfig::default())
    }
}

impl From<&RosterConfig> for ReconcileOptions {
    fn from(config: &RosterConfig) -> Self {
        Self {
            collection: config.document.collection.clone(),
            page_size: config.credential.page_size,
            canonical_domain: config.credential.canonical_domain.clone(),
            detect_ambiguity: config.reconcile.detect_ambiguity,
            repair_linked_handles: config.reconcile.repair_linked_handles,
            dry_run: config.reconcile.dry_run,
        }
    }
}

/// Cooperative stop flag, checked before each record is started.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trip the flag on ctrl-c; a second ctrl-c exits the process. Must be
    /// called inside a tokio runtime.
    pub fn stop_on_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if signal
                .watch(|| async { tokio::signal::ctrl_c().await.is_ok() })
                .await
            {
                error!("Second interrupt received, exiting without waiting for the current record");
                std::process::exit(130);
            }
        });
    }

    /// Stop on the first interrupt. Returns `true` once a second one arrives.
    async fn watch<F, Fut>(&self, mut interrupted: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        if !interrupted().await {
            return false;
        }
        warn!("Interrupt received, stopping after the current record; interrupt again to exit");
        self.stop();
        interrupted().await
    }
}

/// Tallies accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub identities_indexed: usize,
    pub records_total: usize,
    pub records_processed: usize,
    pub already_linked: usize,
    pub matched_by_name: usize,
    pub matched_by_fallback: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub ambiguous: usize,
    pub linked: usize,
    pub handles_updated: usize,
    pub update_failures: usize,
    pub interrupted: bool,
    /// Hits per match label.
    pub label_counts: BTreeMap<String, usize>,
    pub issues: Vec<RecordIssue>,
}

impl ReconcileSummary {
    /// Boundary writes requested and accepted during the run.
    pub fn updates_applied(&self) -> usize {
        self.linked + self.handles_updated
    }

    fn record_match(&mut self, found: &Match) {
        if found.label.is_fallback() {
            self.matched_by_fallback += 1;
        } else {
            self.matched_by_name += 1;
        }
        *self.label_counts.entry(found.label.to_string()).or_default() += 1;
        if found.is_ambiguous() {
            self.ambiguous += 1;
        }
    }

    fn record_issue(&mut self, issue: RecordIssue) {
        match &issue {
            RecordIssue::RecordSkipped { .. } => self.skipped += 1,
            RecordIssue::NoMatchFound { .. } => self.unmatched += 1,
            RecordIssue::UpdateFailed { .. } => self.update_failures += 1,
        }
        self.issues.push(issue);
    }

    /// Multi-line end-of-run report.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "RECONCILIATION SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Identities indexed:     {}", self.identities_indexed)?;
        writeln!(f, "Roster records:         {}", self.records_total)?;
        writeln!(f, "Processed:              {}", self.records_processed)?;
        writeln!(f, "Already linked:         {}", self.already_linked)?;
        writeln!(f, "Linked this run:        {}", self.linked)?;
        writeln!(f, "Handles updated:        {}", self.handles_updated)?;
        if self.interrupted {
            writeln!(f, "Run interrupted before all records were processed")?;
        }
        writeln!(f)?;
        writeln!(f, "Matching breakdown:")?;
        writeln!(f, "  Name-based:           {}", self.matched_by_name)?;
        writeln!(f, "  Doc ID fallback:      {}", self.matched_by_fallback)?;
        writeln!(f, "  Unmatched:            {}", self.unmatched)?;
        writeln!(f, "  Skipped:              {}", self.skipped)?;
        writeln!(f, "  Ambiguous:            {}", self.ambiguous)?;
        if !self.label_counts.is_empty() {
            writeln!(f)?;
            writeln!(f, "Match labels:")?;
            for (label, count) in &self.label_counts {
                writeln!(f, "  {label}: {count}")?;
            }
        }
        if !self.issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "Issues ({}):", self.issues.len())?;
            for (position, issue) in self.issues.iter().enumerate() {
                writeln!(f, "  {}. {}", position + 1, issue)?;
            }
            writeln!(f)?;
            writeln!(f, "Issue breakdown:")?;
            writeln!(f, "  No matching identity: {}", self.unmatched)?;
            writeln!(f, "  Update failed:        {}", self.update_failures)?;
            writeln!(f, "  Missing names:        {}", self.skipped)?;
        }
        Ok(())
    }
}

/// Sequential reconciliation over a pair of stores.
pub struct Reconciler<'a> {
    credentials: &'a dyn CredentialStore,
    documents: &'a dyn DocumentStore,
    options: ReconcileOptions,
    matcher: Matcher,
    stop: StopSignal,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        credentials: &'a dyn CredentialStore,
        documents: &'a dyn DocumentStore,
        options: ReconcileOptions,
    ) -> Self {
        let matcher = Matcher::new(options.detect_ambiguity);
        Self {
            credentials,
            documents,
            options,
            matcher,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Page through the credential store and index every handle.
    pub async fn load_snapshot(&self) -> Result<HandleIndex, ReconcileError> {
        let identities = list_all_identities(self.credentials, self.options.page_size)
            .await
            .map_err(ReconcileError::SnapshotUnavailable)?;
        let index = HandleIndex::from_identities(identities);
        let stats = index.stats();
        info!(
            indexed = stats.indexed,
            missing_handle = stats.missing_handle,
            duplicate_handle = stats.duplicate_handle,
            "Built handle index"
        );
        Ok(index)
    }

    /// Load a fresh snapshot, then reconcile every roster record.
    pub async fn run(&self) -> Result<ReconcileSummary, ReconcileError> {
        let index = self.load_snapshot().await?;
        self.run_with_index(&index).await
    }

    /// Reconcile every roster record against a prepared index.
    pub async fn run_with_index(
        &self,
        index: &HandleIndex,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let collection = self.options.collection.as_str();
        let records = self
            .documents
            .list_records(collection)
            .await
            .map_err(|source| ReconcileError::RecordsUnavailable {
                collection: collection.to_string(),
                source,
            })?;

        let domains: Vec<String> = index
            .top_domains(DEFAULT_TOP_DOMAINS)
            .into_iter()
            .map(|(domain, count)| format!("{domain}({count})"))
            .collect();
        info!(
            records = records.len(),
            identities = index.len(),
            top_domains = %domains.join(", "),
            dry_run = self.options.dry_run,
            "Reconciling roster"
        );
        if index.len() < records.len() {
            warn!(
                records = records.len(),
                identities = index.len(),
                missing = records.len() - index.len(),
                "Fewer identities than roster records; some records cannot be matched"
            );
        }

        let mut summary = ReconcileSummary {
            identities_indexed: index.len(),
            records_total: records.len(),
            ..ReconcileSummary::default()
        };
        for record in &records {
            if self.stop.is_stopped() {
                summary.interrupted = true;
                warn!(
                    processed = summary.records_processed,
                    remaining = records.len() - summary.records_processed,
                    "Stopping before next record"
                );
                break;
            }
            self.process_record(record, index, &mut summary).await;
            summary.records_processed += 1;
        }

        info!(
            linked = summary.linked,
            by_name = summary.matched_by_name,
            by_fallback = summary.matched_by_fallback,
            unmatched = summary.unmatched,
            issues = summary.issues.len(),
            "Reconciliation finished"
        );
        Ok(summary)
    }

    async fn process_record(
        &self,
        record: &RosterRecord,
        index: &dyn HandleLookup,
        summary: &mut ReconcileSummary,
    ) {
        if let Some(identity) = &record.linked_identity {
            summary.already_linked += 1;
            debug!(record = %record.id, identity = %identity, "Already linked");
            if self.options.repair_linked_handles && record.has_names() && !self.options.dry_run {
                if let Err(issue) = self.ensure_canonical_handle(record, identity, summary).await {
                    summary.record_issue(issue);
                }
            }
            return;
        }

        if !record.has_names() {
            warn!(record = %record.id, "Skipping record without given and family name");
            summary.record_issue(RecordIssue::RecordSkipped {
                record: record.id.clone(),
            });
            return;
        }

        let found = match self.matcher.resolve(
            &record.first_name,
            &record.last_name,
            Some(record.id.as_str()),
            index,
        ) {
            MatchResult::Matched(found) => found,
            MatchResult::NoMatch => {
                warn!(record = %record.id, name = %record.full_name(), "No matching identity");
                summary.record_issue(RecordIssue::NoMatchFound {
                    record: record.id.clone(),
                    name: record.full_name(),
                });
                return;
            }
        };

        info!(
            record = %record.id,
            name = %record.full_name(),
            handle = %found.handle,
            identity = %found.identity,
            label = %found.label,
            "Matched"
        );
        if found.is_ambiguous() {
            let rivals: Vec<&str> = found.rivals.iter().map(IdentityId::as_str).collect();
            warn!(
                record = %record.id,
                label = %found.label,
                chosen = %found.identity,
                rivals = %rivals.join(", "),
                "Ambiguous match, keeping first identity in snapshot order"
            );
        }
        summary.record_match(&found);

        if self.options.dry_run {
            return;
        }

        // Handle first: a failed rewrite leaves the record unlinked so a
        // later run retries it.
        if let Err(issue) = self
            .ensure_canonical_handle(record, &found.identity, summary)
            .await
        {
            summary.record_issue(issue);
            return;
        }

        match self
            .documents
            .update_record(
                &self.options.collection,
                &record.id,
                RecordUpdate::link(found.identity.clone()),
            )
            .await
        {
            Ok(()) => {
                summary.linked += 1;
                info!(record = %record.id, identity = %found.identity, "Linked record");
            }
            Err(source) => {
                error!(record = %record.id, error = %source, "Link update failed");
                summary.record_issue(update_failed(record, &found.identity, UpdateStage::Link, source));
            }
        }
    }

    async fn ensure_canonical_handle(
        &self,
        record: &RosterRecord,
        identity: &IdentityId,
        summary: &mut ReconcileSummary,
    ) -> Result<(), RecordIssue> {
        let canonical = canonical_handle(
            &record.first_name,
            &record.last_name,
            &self.options.canonical_domain,
        );
        let current = self
            .credentials
            .get_identity(identity)
            .await
            .map_err(|source| {
                error!(record = %record.id, identity = %identity, error = %source, "Identity lookup failed");
                update_failed(record, identity, UpdateStage::Handle, source)
            })?;

        if current.handle() == Some(canonical.as_str()) {
            debug!(identity = %identity, handle = %canonical, "Handle already canonical");
            return Ok(());
        }

        self.credentials
            .update_identity(identity, IdentityUpdate::handle(canonical.clone()))
            .await
            .map_err(|source| {
                error!(record = %record.id, identity = %identity, error = %source, "Handle update failed");
                update_failed(record, identity, UpdateStage::Handle, source)
            })?;
        summary.handles_updated += 1;
        info!(
            identity = %identity,
            from = current.handle().unwrap_or(""),
            to = %canonical,
            "Updated handle"
        );
        Ok(())
    }
}

fn update_failed(
    record: &RosterRecord,
    identity: &IdentityId,
    stage: UpdateStage,
    source: StoreError,
) -> RecordIssue {
    RecordIssue::UpdateFailed {
        record: record.id.clone(),
        name: record.full_name(),
        identity: identity.clone(),
        stage,
        source,
    }
}
