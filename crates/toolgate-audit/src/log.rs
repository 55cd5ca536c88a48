//! # Audit Log
//!
//! Redacts, timestamps and hash-chains entries before handing them to an
//! [`AuditSink`]. Appends are serialized by a mutex so `sequence` and
//! `previous_hash` are always taken from the true predecessor.
//!
//! Primary action audit ([`AuditLog::record`]) propagates failures.
//! Security-event audit ([`AuditLog::record_security_event`]) is best-effort
//! unless `strict_audit` is set. Neither ever changes a policy verdict.

use std::sync::Arc;

use parking_lot::Mutex;
use toolgate_core::{Clock, GateConfig};

use crate::entry::{AuditEntry, AuditEntryId, AuditEntryInput};
use crate::error::AuditError;
use crate::hash::{entry_hash, GENESIS_HASH};
use crate::query::{
    AuditFilter, AuditMetrics, AuditPage, ChainIntegrity, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::redact::redact;
use crate::sink::{AuditSink, InMemoryAuditSink};

/// The append-only audit log.
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    strict: bool,
    append_lock: Mutex<()>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Create a log over `sink`.
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, config: &GateConfig) -> Self {
        Self {
            sink,
            clock,
            strict: config.strict_audit,
            append_lock: Mutex::new(()),
        }
    }

    /// Create a log over a fresh in-memory sink.
    pub fn in_memory(clock: Arc<dyn Clock>, config: &GateConfig) -> Self {
        Self::new(Arc::new(InMemoryAuditSink::new()), clock, config)
    }

    /// Whether security-event failures propagate.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Persist a primary action entry.
    pub fn record(&self, input: AuditEntryInput) -> Result<AuditEntryId, AuditError> {
        let data = redact(&input.payload);
        let _guard = self.append_lock.lock();

        let (sequence, previous_hash) = match self.sink.last()? {
            Some(last) => (last.sequence + 1, last.entry_hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let mut entry = AuditEntry {
            id: AuditEntryId::new(),
            sequence,
            action: input.action,
            user_id: input.actor,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            mode: input.mode,
            data,
            before_hash: input.before_hash,
            after_hash: input.after_hash,
            status: input.status,
            policy_version: input.policy_version,
            policy_verdict: input.policy_verdict,
            policy_reason: input.policy_reason,
            policy_details: input.policy_details,
            error_code: input.error_code,
            error_category: input.error_category,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            created_at: self.clock.now(),
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry_hash(&entry)?;

        let id = entry.id;
        tracing::debug!(
            %id,
            sequence,
            action = %entry.action,
            status = %entry.status,
            "audit entry recorded"
        );
        self.sink.append(entry)?;
        Ok(id)
    }

    /// Persist a security-relevant entry.
    ///
    /// Returns `Ok(None)` when the write failed and the log is not strict;
    /// the failure is logged at `error`.
    pub fn record_security_event(
        &self,
        input: AuditEntryInput,
    ) -> Result<Option<AuditEntryId>, AuditError> {
        let action = input.action.clone();
        match self.record(input) {
            Ok(id) => Ok(Some(id)),
            Err(e) if self.strict => Err(e),
            Err(e) => {
                tracing::error!(%action, error = %e, "security audit write failed; continuing");
                Ok(None)
            }
        }
    }

    /// Entries matching `filter`, newest first.
    ///
    /// A `limit` of zero means [`DEFAULT_PAGE_SIZE`]; larger values are capped
    /// at [`MAX_PAGE_SIZE`].
    pub fn query(
        &self,
        filter: &AuditFilter,
        limit: usize,
        offset: usize,
    ) -> Result<AuditPage, AuditError> {
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let mut matching: Vec<AuditEntry> = self
            .sink
            .entries()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        matching.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let total = matching.len();
        let entries = matching.into_iter().skip(offset).take(limit).collect();
        Ok(AuditPage {
            entries,
            total,
            limit,
            offset,
        })
    }

    /// Aggregate counts over entries matching `filter`.
    pub fn metrics(&self, filter: &AuditFilter) -> Result<AuditMetrics, AuditError> {
        let mut metrics = AuditMetrics::default();
        for entry in self.sink.entries()?.iter().filter(|e| filter.matches(e)) {
            metrics.add(entry);
        }
        Ok(metrics)
    }

    /// Recompute every entry hash and check every link.
    pub fn verify_chain(&self) -> Result<ChainIntegrity, AuditError> {
        let entries = self.sink.entries()?;
        let mut broken_links = 0;
        let mut tampered_entries = Vec::new();
        let mut expected_previous = GENESIS_HASH.to_string();

        for entry in &entries {
            if entry.previous_hash != expected_previous {
                broken_links += 1;
            }
            if entry_hash(entry)? != entry.entry_hash {
                tampered_entries.push(entry.sequence);
            }
            expected_previous = entry.entry_hash.clone();
        }

        let chain_valid = broken_links == 0 && tampered_entries.is_empty();
        if !chain_valid {
            tracing::warn!(
                broken_links,
                tampered = tampered_entries.len(),
                "audit chain verification failed"
            );
        }
        Ok(ChainIntegrity {
            total_entries: entries.len(),
            broken_links,
            tampered_entries,
            chain_valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AuditStatus, ErrorCategory, VerdictOutcome};
    use chrono::Duration;
    use serde_json::json;
    use toolgate_core::{ActorId, FixedClock, ToolName};
    use toolgate_policy::{PolicyVerdict, ReasonCode};

    fn log_with_sink() -> (AuditLog, Arc<InMemoryAuditSink>, Arc<FixedClock>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let clock = Arc::new(FixedClock::at_utc(2026, 3, 2, 10, 0).unwrap());
        let log = AuditLog::new(sink.clone(), clock.clone(), &GateConfig::default());
        (log, sink, clock)
    }

    fn input(tool: &str, actor: &str, status: AuditStatus) -> AuditEntryInput {
        AuditEntryInput::new(
            ToolName::new(tool).unwrap(),
            ActorId::new(actor).unwrap(),
            "post",
            status,
        )
    }

    #[test]
    fn record_redacts_payload() {
        let (log, sink, _) = log_with_sink();
        log.record(
            input("posts.create", "7", AuditStatus::Success)
                .with_payload(json!({"title": "t", "password": "p", "nested": {"Email": "e"}})),
        )
        .unwrap();
        let stored = &sink.entries().unwrap()[0];
        assert_eq!(
            stored.data,
            json!({"title": "t", "password": "[REDACTED]", "nested": {"Email": "[REDACTED]"}})
        );
    }

    #[test]
    fn entries_are_chained() {
        let (log, sink, _) = log_with_sink();
        for _ in 0..3 {
            log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        }
        let entries = sink.entries().unwrap();
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].entry_hash);
        assert_eq!(entries[2].previous_hash, entries[1].entry_hash);
        assert!(log.verify_chain().unwrap().chain_valid);
    }

    #[test]
    fn tampering_is_detected() {
        let (log, sink, _) = log_with_sink();
        for _ in 0..3 {
            log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        }
        let mut forged = sink.entries().unwrap()[1].clone();
        forged.status = AuditStatus::Error;
        assert!(sink.overwrite(1, forged));

        let integrity = log.verify_chain().unwrap();
        assert!(!integrity.chain_valid);
        assert_eq!(integrity.tampered_entries, vec![2]);
        assert_eq!(integrity.broken_links, 0);
    }

    #[test]
    fn retyped_payload_and_shifted_timestamp_are_detected() {
        let (log, sink, _) = log_with_sink();
        let priced = input("products.update", "7", AuditStatus::Success)
            .with_payload(json!({"price": 19.99}));
        log.record(priced).unwrap();
        log.record(input("products.update", "7", AuditStatus::Success)).unwrap();

        let mut forged = sink.entries().unwrap()[0].clone();
        forged.data = json!({"price": "19.99"});
        forged.created_at += Duration::milliseconds(900);
        assert!(sink.overwrite(0, forged));

        let integrity = log.verify_chain().unwrap();
        assert!(!integrity.chain_valid);
        assert_eq!(integrity.tampered_entries, vec![1]);
    }

    #[test]
    fn subsecond_timestamp_shift_alone_is_detected() {
        let (log, sink, _) = log_with_sink();
        log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();

        let mut forged = sink.entries().unwrap()[0].clone();
        forged.created_at += Duration::milliseconds(250);
        assert!(sink.overwrite(0, forged));

        assert_eq!(log.verify_chain().unwrap().tampered_entries, vec![1]);
    }

    #[test]
    fn query_filters_and_orders_newest_first() {
        let (log, _, clock) = log_with_sink();
        log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        clock.advance(Duration::minutes(1));
        log.record(input("posts.update", "7", AuditStatus::Denied)).unwrap();
        clock.advance(Duration::minutes(1));
        log.record(input("posts.create", "8", AuditStatus::Success)).unwrap();

        let page = log.query(&AuditFilter::all(), 10, 0).unwrap();
        assert_eq!(page.total, 3);
        let seqs: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 2, 1]);

        let by_actor = log
            .query(&AuditFilter::all().with_actor(ActorId::new("7").unwrap()), 10, 0)
            .unwrap();
        assert_eq!(by_actor.total, 2);

        let combined = AuditFilter::all()
            .with_action(ToolName::new("posts.create").unwrap())
            .with_status(AuditStatus::Success)
            .with_actor(ActorId::new("8").unwrap());
        assert_eq!(log.query(&combined, 10, 0).unwrap().total, 1);
    }

    #[test]
    fn query_paginates() {
        let (log, _, _) = log_with_sink();
        for _ in 0..5 {
            log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        }
        let page = log.query(&AuditFilter::all(), 2, 2).unwrap();
        assert_eq!(page.total, 5);
        let seqs: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 2]);
    }

    #[test]
    fn zero_limit_uses_default_page_size() {
        let (log, _, _) = log_with_sink();
        for _ in 0..(DEFAULT_PAGE_SIZE + 5) {
            log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        }
        let page = log.query(&AuditFilter::all(), 0, 0).unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.entries.len(), DEFAULT_PAGE_SIZE);
        assert_eq!(page.total, DEFAULT_PAGE_SIZE + 5);
        assert_eq!(log.query(&AuditFilter::all(), 10_000, 0).unwrap().limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn query_by_date_range() {
        let (log, _, clock) = log_with_sink();
        let start = clock.now();
        log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();
        clock.advance(Duration::days(1));
        log.record(input("posts.create", "7", AuditStatus::Success)).unwrap();

        let filter = AuditFilter::all().with_range(Some(start), Some(start + Duration::hours(1)));
        assert_eq!(log.query(&filter, 10, 0).unwrap().total, 1);
    }

    #[test]
    fn metrics_rollup() {
        let (log, _, clock) = log_with_sink();
        let allowed = PolicyVerdict::allow(ReasonCode::Approved, "ok");
        let denied = PolicyVerdict::deny(ReasonCode::BlockedTerm, "no");
        log.record(input("posts.create", "7", AuditStatus::Success).with_verdict(&allowed))
            .unwrap();
        log.record(
            input("posts.create", "7", AuditStatus::Denied)
                .with_verdict(&denied)
                .with_error("policy_denied", ErrorCategory::Policy),
        )
        .unwrap();
        clock.advance(Duration::days(1));
        log.record(
            input("products.update", "8", AuditStatus::Error)
                .with_error("not_found", ErrorCategory::NotFound),
        )
        .unwrap();

        let m = log.metrics(&AuditFilter::all()).unwrap();
        assert_eq!(m.total, 3);
        assert_eq!(m.by_status["success"], 1);
        assert_eq!(m.by_status["denied"], 1);
        assert_eq!(m.by_status["error"], 1);
        assert_eq!(m.by_error_category["policy"], 1);
        assert_eq!(m.by_action["posts.create"], 2);
        assert_eq!(m.by_day["2026-03-02"], 2);
        assert_eq!(m.by_day["2026-03-03"], 1);
        assert_eq!((m.allowed, m.denied), (1, 1));

        let denied_only = log
            .metrics(&AuditFilter::all().with_policy_verdict(VerdictOutcome::Denied))
            .unwrap();
        assert_eq!(denied_only.total, 1);
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Sink("disk full".into()))
        }
        fn last(&self) -> Result<Option<AuditEntry>, AuditError> {
            Ok(None)
        }
        fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    fn failing_log(strict: bool) -> AuditLog {
        let config = GateConfig {
            strict_audit: strict,
            ..GateConfig::default()
        };
        AuditLog::new(
            Arc::new(FailingSink),
            Arc::new(FixedClock::at_utc(2026, 3, 2, 10, 0).unwrap()),
            &config,
        )
    }

    #[test]
    fn primary_record_failure_propagates() {
        let log = failing_log(false);
        assert!(log.record(input("posts.create", "7", AuditStatus::Success)).is_err());
    }

    #[test]
    fn security_event_failure_is_best_effort() {
        let log = failing_log(false);
        let out = log
            .record_security_event(input("posts.create", "7", AuditStatus::Denied))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn security_event_failure_is_fatal_when_strict() {
        let log = failing_log(true);
        assert!(log
            .record_security_event(input("posts.create", "7", AuditStatus::Denied))
            .is_err());
    }

    #[test]
    fn concurrent_records_keep_chain_valid() {
        let (log, sink, _) = log_with_sink();
        std::thread::scope(|s| {
            for t in 0..4 {
                let log = &log;
                s.spawn(move || {
                    for _ in 0..10 {
                        log.record(input("posts.create", &format!("{t}"), AuditStatus::Success))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(sink.len(), 40);
        let integrity = log.verify_chain().unwrap();
        assert!(integrity.chain_valid);
        assert_eq!(integrity.total_entries, 40);
    }
}
