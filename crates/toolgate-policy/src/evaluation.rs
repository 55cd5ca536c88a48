//! # Policy Evaluation
//!
//! [`PolicyEvaluator::decide`] answers whether an agent-proposed tool call
//! may proceed. The checks run in a fixed order and stop at the first
//! denial:
//!
//! 1. sanitize the tool name, entity id and fields
//! 2. look up the tool's active policy
//! 3. rate limits (`per_hour`, `per_day`, `per_ip_hour`)
//! 4. time windows (blackout, allowed hours, allowed days)
//! 5. content restrictions (blocked terms, blocked patterns)
//! 6. entity rules (post type, status)
//! 7. approval workflows
//!
//! `decide` never fails. Internal failures deny with
//! [`ReasonCode::UnknownError`] and a generic detail; the cause is logged.
//! The only side effect is the rate-limit counter increment.

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use serde_json::Value;
use toolgate_core::temporal::to_local;
use toolgate_core::{
    ActorContext, Clock, EntityId, FieldSanitizer, GateConfig, StoreFailureMode, ToolName,
};

use crate::approval::{
    ApprovalLedger, ApprovalWorkflowEngine, CapabilityProvider, InMemoryApprovalLedger, NoBypass,
};
use crate::document::{CompiledPolicy, TimeWindows};
use crate::rate_limit::{CounterStore, InMemoryCounterStore, RateLimitScope, RateLimiter};
use crate::store::{ActivePolicy, PolicyStore};
use crate::verdict::{PolicyVerdict, ReasonCode};

/// Identity used for `per_ip_hour` when the client IP is unknown.
pub const UNKNOWN_IP: &str = "unknown";

const INTERNAL_ERROR_DETAIL: &str = "Policy evaluation failed due to an internal error";

/// Type and status of a host entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySnapshot {
    /// Entity (post) type, e.g. `post`, `page`, `product`.
    pub entity_type: String,
    /// Entity status, e.g. `draft`, `publish`.
    pub status: String,
}

/// Resolves entity metadata for entity rules.
pub trait EntityLookup: Send + Sync {
    /// The entity's type and status, or `None` if it does not exist.
    fn type_and_status(&self, entity_id: EntityId) -> Option<EntitySnapshot>;
}

/// The policy decision point.
pub struct PolicyEvaluator {
    store: Arc<PolicyStore>,
    limiter: RateLimiter,
    approvals: ApprovalWorkflowEngine,
    capabilities: Arc<dyn CapabilityProvider>,
    entities: Option<Arc<dyn EntityLookup>>,
    clock: Arc<dyn Clock>,
    sanitizer: FieldSanitizer,
    config: GateConfig,
}

impl std::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("entity_lookup", &self.entities.is_some())
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    /// Assemble an evaluator from its collaborators.
    pub fn new(
        store: Arc<PolicyStore>,
        counters: Arc<dyn CounterStore>,
        ledger: Arc<dyn ApprovalLedger>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Self {
        Self {
            store,
            limiter: RateLimiter::new(counters, Arc::clone(&clock)),
            approvals: ApprovalWorkflowEngine::new(ledger, Arc::clone(&clock)),
            capabilities: Arc::new(NoBypass),
            entities: None,
            clock,
            sanitizer: FieldSanitizer::new(config.max_field_depth),
            config,
        }
    }

    /// An evaluator with in-memory store, counters and ledger.
    pub fn in_memory(clock: Arc<dyn Clock>, config: GateConfig) -> Self {
        Self::new(
            Arc::new(PolicyStore::in_memory(Arc::clone(&clock))),
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(InMemoryApprovalLedger::new()),
            clock,
            config,
        )
    }

    /// Builder: set the admin-bypass provider.
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Builder: install an entity lookup for entity rules.
    pub fn with_entity_lookup(mut self, entities: Arc<dyn EntityLookup>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// The policy store.
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// The approval engine, for recording and revoking approvals.
    pub fn approvals(&self) -> &ApprovalWorkflowEngine {
        &self.approvals
    }

    /// The rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The active configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide whether `actor` may run `tool` with `fields` against
    /// `entity_id`.
    pub fn decide(
        &self,
        tool: &str,
        entity_id: Option<i64>,
        fields: &Value,
        actor: &ActorContext,
    ) -> PolicyVerdict {
        let verdict = self.evaluate(tool, entity_id, fields, actor);
        if verdict.allowed {
            tracing::debug!(
                tool,
                reason = %verdict.reason,
                actor = %actor.id,
                "policy allowed"
            );
        } else {
            tracing::info!(
                tool,
                reason = %verdict.reason,
                actor = %actor.id,
                rule = verdict.triggering_rule.as_deref().unwrap_or(""),
                details = %verdict.details,
                "policy denied"
            );
        }
        verdict
    }

    fn evaluate(
        &self,
        raw_tool: &str,
        entity_id: Option<i64>,
        fields: &Value,
        actor: &ActorContext,
    ) -> PolicyVerdict {
        let Ok(tool) = ToolName::new(raw_tool) else {
            return PolicyVerdict::deny(ReasonCode::InvalidTool, "Tool name is empty or invalid");
        };
        let entity_id = EntityId::clamp(entity_id);
        let fields = self.sanitizer.sanitize(fields);

        let active = match self.store.get_active(&tool) {
            Ok(Some(active)) => active,
            Ok(None) => {
                return PolicyVerdict::deny(
                    ReasonCode::NoPolicy,
                    format!("No active policy for tool {tool}"),
                );
            }
            Err(e) => {
                tracing::error!(%tool, error = %e, "policy lookup failed");
                return PolicyVerdict::deny(ReasonCode::UnknownError, INTERNAL_ERROR_DETAIL);
            }
        };
        let version = active.version.map(|v| v.to_string());

        let denial = self
            .check_rate_limits(&tool, &active, actor)
            .or_else(|| check_time_windows(&active.policy, &self.now_local()))
            .or_else(|| check_content(&active.policy, &fields))
            .or_else(|| self.check_entity_rules(&active.policy, entity_id));
        if let Some(verdict) = denial {
            return verdict.with_policy_version(version);
        }

        self.check_approvals(&tool, &active.policy, entity_id, &fields, actor)
            .with_policy_version(version)
    }

    fn now_local(&self) -> LocalTime {
        let local = to_local(self.clock.now(), self.config.utc_offset_minutes);
        LocalTime {
            weekday: local.weekday().number_from_monday(),
            hour: local.hour(),
            minute: local.hour() * 60 + local.minute(),
        }
    }

    fn check_rate_limits(
        &self,
        tool: &ToolName,
        active: &ActivePolicy,
        actor: &ActorContext,
    ) -> Option<PolicyVerdict> {
        let limits = active.document().rate_limits.as_ref()?;
        let ip = actor
            .ip
            .as_deref()
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or(UNKNOWN_IP);
        let scopes = [
            (RateLimitScope::PerHour, limits.per_hour, actor.id.as_str()),
            (RateLimitScope::PerDay, limits.per_day, actor.id.as_str()),
            (RateLimitScope::PerIpHour, limits.per_ip_hour, ip),
        ];

        for (scope, limit, identity) in scopes {
            let Some(limit) = limit else { continue };
            match self.limiter.check_scope(tool, scope, identity, limit) {
                Ok(outcome) if outcome.exceeded => {
                    return Some(
                        PolicyVerdict::deny(
                            ReasonCode::RateLimitExceeded,
                            format!(
                                "Rate limit exceeded for {scope}: {}/{}",
                                outcome.current, outcome.limit
                            ),
                        )
                        .with_rule(scope.as_str()),
                    );
                }
                Ok(_) => {}
                Err(e) => match self.config.store_failure_mode {
                    StoreFailureMode::Open => {
                        tracing::warn!(
                            %tool,
                            %scope,
                            error = %e,
                            "counter store failed; skipping scope"
                        );
                    }
                    StoreFailureMode::Closed => {
                        tracing::error!(%tool, %scope, error = %e, "counter store failed; denying");
                        return Some(
                            PolicyVerdict::deny(ReasonCode::UnknownError, INTERNAL_ERROR_DETAIL)
                                .with_rule(scope.as_str()),
                        );
                    }
                },
            }
        }
        None
    }

    fn check_entity_rules(
        &self,
        policy: &CompiledPolicy,
        entity_id: Option<EntityId>,
    ) -> Option<PolicyVerdict> {
        let rules = policy.document.entity_rules.as_ref()?;
        if rules.allowed_post_types.is_empty() && rules.allowed_statuses.is_empty() {
            return None;
        }
        let entity_id = entity_id?;
        let snapshot = self.entities.as_ref()?.type_and_status(entity_id)?;

        if !rules.allowed_post_types.is_empty()
            && !rules.allowed_post_types.contains(&snapshot.entity_type)
        {
            return Some(
                PolicyVerdict::deny(
                    ReasonCode::PostTypeRestriction,
                    format!(
                        "Entity type '{}' is not allowed (allowed: {})",
                        snapshot.entity_type,
                        rules.allowed_post_types.join(", ")
                    ),
                )
                .with_rule("allowed_post_types"),
            );
        }
        if !rules.allowed_statuses.is_empty()
            && !rules.allowed_statuses.contains(&snapshot.status)
        {
            return Some(
                PolicyVerdict::deny(
                    ReasonCode::StatusRestriction,
                    format!(
                        "Entity status '{}' is not allowed (allowed: {})",
                        snapshot.status,
                        rules.allowed_statuses.join(", ")
                    ),
                )
                .with_rule("allowed_statuses"),
            );
        }
        None
    }

    fn check_approvals(
        &self,
        tool: &ToolName,
        policy: &CompiledPolicy,
        entity_id: Option<EntityId>,
        fields: &Value,
        actor: &ActorContext,
    ) -> PolicyVerdict {
        let workflows = match policy.document.approval_workflows.as_deref() {
            Some(w) if !w.is_empty() => w,
            _ => return PolicyVerdict::allow(ReasonCode::Approved, "All policy checks passed"),
        };

        if self.capabilities.has_admin_bypass(&actor.id) {
            return PolicyVerdict::allow(
                ReasonCode::AdminBypass,
                "Approval workflows bypassed by administrator",
            );
        }

        let Some(workflow) = self.approvals.requires_approval(workflows, tool, fields) else {
            return PolicyVerdict::allow(ReasonCode::Approved, "All policy checks passed");
        };

        match self.approvals.has_approval(tool, entity_id, &actor.id) {
            Ok(true) => PolicyVerdict::allow(
                ReasonCode::Approved,
                format!("Approved under workflow '{}'", workflow.name),
            )
            .with_rule(workflow.name.clone()),
            Ok(false) => PolicyVerdict::deny(
                ReasonCode::ApprovalRequired,
                format!("Approval required by workflow '{}'", workflow.name),
            )
            .with_rule(workflow.name.clone()),
            Err(e) => {
                tracing::error!(%tool, error = %e, "approval ledger failed");
                PolicyVerdict::deny(ReasonCode::UnknownError, INTERNAL_ERROR_DETAIL)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stateless checks
// ---------------------------------------------------------------------------

/// Local wall-clock time at the configured offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalTime {
    /// ISO weekday, 1 = Monday.
    weekday: u32,
    hour: u32,
    /// Minutes since local midnight.
    minute: u32,
}

fn check_time_windows(policy: &CompiledPolicy, now: &LocalTime) -> Option<PolicyVerdict> {
    let windows: &TimeWindows = policy.document.time_windows.as_ref()?;

    if let Some(blackout) = policy
        .blackout_windows
        .iter()
        .find(|w| w.covers(now.weekday, now.minute))
    {
        return Some(
            PolicyVerdict::deny(
                ReasonCode::BlackoutWindow,
                format!("Action blocked during blackout window {}", blackout.label),
            )
            .with_rule(blackout.label.clone()),
        );
    }

    if !windows.allowed_hours.is_empty() && !windows.allowed_hours.contains(&now.hour) {
        return Some(
            PolicyVerdict::deny(
                ReasonCode::TimeRestriction,
                format!("Action not allowed at hour {}", now.hour),
            )
            .with_rule("allowed_hours"),
        );
    }

    if !windows.allowed_days.is_empty() && !windows.allowed_days.contains(&now.weekday) {
        return Some(
            PolicyVerdict::deny(
                ReasonCode::DayRestriction,
                format!("Action not allowed on day {}", now.weekday),
            )
            .with_rule("allowed_days"),
        );
    }
    None
}

fn check_content(policy: &CompiledPolicy, fields: &Value) -> Option<PolicyVerdict> {
    if policy.blocked_terms.is_empty() && policy.blocked_patterns.is_empty() {
        return None;
    }
    let strings = string_fields(fields);

    for term in &policy.blocked_terms {
        for (path, text) in &strings {
            if text.to_lowercase().contains(&term.lowered) {
                let severity = term
                    .severity
                    .map(|s| format!(" (severity: {s})"))
                    .unwrap_or_default();
                return Some(
                    PolicyVerdict::deny(
                        ReasonCode::BlockedTerm,
                        format!("Blocked term '{}' found in field '{path}'{severity}", term.term),
                    )
                    .with_rule(term.term.clone()),
                );
            }
        }
    }

    for pattern in &policy.blocked_patterns {
        for (path, text) in &strings {
            if pattern.regex.is_match(text) {
                return Some(
                    PolicyVerdict::deny(
                        ReasonCode::BlockedPattern,
                        format!("Field '{path}' matches blocked pattern '{}'", pattern.source),
                    )
                    .with_rule(pattern.source.clone()),
                );
            }
        }
    }
    None
}

/// Every string value in `fields` with its dotted path, in document order.
pub fn string_fields(fields: &Value) -> Vec<(String, &str)> {
    fn child(path: &str, key: &str) -> String {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    }
    fn walk<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a str)>) {
        match value {
            Value::String(s) => out.push((path, s)),
            Value::Object(map) => {
                for (k, v) in map {
                    walk(v, child(&path, k), out);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    walk(v, child(&path, &i.to_string()), out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(fields, String::new(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::StaticCapabilities;
    use crate::document::PolicyDocument;
    use crate::rate_limit::{CounterOutcome, CounterStoreError};
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use toolgate_core::{ActorId, FixedClock};

    // 2026-03-02 is a Monday.
    fn clock_at(hour: u32, minute: u32) -> Arc<FixedClock> {
        Arc::new(FixedClock::at_utc(2026, 3, 2, hour, minute).unwrap())
    }

    fn evaluator(clock: Arc<FixedClock>) -> PolicyEvaluator {
        PolicyEvaluator::in_memory(clock, GateConfig::default())
    }

    fn install(e: &PolicyEvaluator, tool: &str, doc: Value) {
        let doc = PolicyDocument::from_value(doc).unwrap();
        e.store()
            .create_version(&ToolName::new(tool).unwrap(), doc, &ActorId::new("admin").unwrap())
            .unwrap();
    }

    fn actor(id: &str) -> ActorContext {
        ActorContext::new(ActorId::new(id).unwrap())
    }

    #[test]
    fn invalid_tool() {
        let e = evaluator(clock_at(10, 0));
        let v = e.decide("  $$$ ", None, &json!({}), &actor("7"));
        assert!(!v.allowed);
        assert_eq!(v.reason, ReasonCode::InvalidTool);
    }

    #[test]
    fn missing_policy_denies() {
        let e = evaluator(clock_at(10, 0));
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert!(!v.allowed);
        assert_eq!(v.reason, ReasonCode::NoPolicy);
    }

    #[test]
    fn empty_policy_approves_with_version() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "posts.create", json!({}));
        let v = e.decide("POSTS.CREATE", None, &json!({"title": "hi"}), &actor("7"));
        assert!(v.allowed);
        assert_eq!(v.reason, ReasonCode::Approved);
        assert_eq!(v.policy_version.as_deref(), Some("0.0.1"));
    }

    #[test]
    fn hour_restriction() {
        let e = evaluator(clock_at(20, 0));
        install(
            &e,
            "posts.create",
            json!({"time_windows": {"allowed_hours": [9, 10, 11, 12, 13, 14, 15, 16, 17]}}),
        );
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::TimeRestriction);
    }

    #[test]
    fn utc_offset_shifts_the_hour() {
        let clock = clock_at(20, 0);
        let config = GateConfig {
            utc_offset_minutes: -10 * 60,
            ..GateConfig::default()
        };
        let e = PolicyEvaluator::in_memory(clock, config);
        install(&e, "posts.create", json!({"time_windows": {"allowed_hours": [10]}}));
        assert!(e.decide("posts.create", None, &json!({}), &actor("7")).allowed);
    }

    #[test]
    fn day_restriction() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "posts.create", json!({"time_windows": {"allowed_days": [6, 7]}}));
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::DayRestriction);
    }

    #[test]
    fn blackout_beats_allowed_hours() {
        let e = evaluator(clock_at(12, 30));
        install(
            &e,
            "posts.create",
            json!({"time_windows": {
                "allowed_hours": [12],
                "blackout_windows": [{"start": "12:00", "end": "13:00", "days": [1]}]
            }}),
        );
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::BlackoutWindow);
        assert_eq!(v.triggering_rule.as_deref(), Some("12:00-13:00"));
    }

    #[test]
    fn blocked_term_in_nested_field() {
        let e = evaluator(clock_at(10, 0));
        install(
            &e,
            "posts.create",
            json!({"content_restrictions": {
                "blocked_terms": ["casino"],
                "severity_levels": {"casino": "high"}
            }}),
        );
        let v = e.decide(
            "posts.create",
            None,
            &json!({"title": "ok", "meta": {"seo": "Best CASINO deals"}}),
            &actor("7"),
        );
        assert_eq!(v.reason, ReasonCode::BlockedTerm);
        assert!(v.details.contains("meta.seo"));
        assert!(v.details.contains("severity: high"));
    }

    #[test]
    fn blocked_term_checked_after_sanitizing() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "posts.create", json!({"content_restrictions": {"blocked_terms": ["casino"]}}));
        let v = e.decide("posts.create", None, &json!({"title": "ca<b>sino</b>"}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::BlockedTerm);
    }

    #[test]
    fn blocked_pattern() {
        let e = evaluator(clock_at(10, 0));
        install(
            &e,
            "posts.create",
            json!({"content_restrictions": {"blocked_patterns": ["/\\d{3}-\\d{4}/"]}}),
        );
        let v = e.decide("posts.create", None, &json!({"content": "call 555-1234"}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::BlockedPattern);
        let ok = e.decide("posts.create", None, &json!({"content": "no numbers"}), &actor("7"));
        assert!(ok.allowed);
    }

    #[test]
    fn rate_limit_then_next_hour() {
        let clock = clock_at(10, 0);
        let e = evaluator(clock.clone());
        install(&e, "posts.create", json!({"rate_limits": {"per_hour": 2}}));
        for _ in 0..2 {
            assert!(e.decide("posts.create", None, &json!({}), &actor("7")).allowed);
        }
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::RateLimitExceeded);
        assert_eq!(v.details, "Rate limit exceeded for per_hour: 2/2");
        assert!(e.decide("posts.create", None, &json!({}), &actor("8")).allowed);

        clock.advance(chrono::Duration::hours(1));
        assert!(e.decide("posts.create", None, &json!({}), &actor("7")).allowed);
    }

    #[test]
    fn per_ip_uses_unknown_without_ip() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "posts.create", json!({"rate_limits": {"per_ip_hour": 1}}));
        assert!(e.decide("posts.create", None, &json!({}), &actor("7")).allowed);
        let v = e.decide("posts.create", None, &json!({}), &actor("8"));
        assert_eq!(v.reason, ReasonCode::RateLimitExceeded);
        assert_eq!(v.triggering_rule.as_deref(), Some("per_ip_hour"));
        assert!(e
            .decide("posts.create", None, &json!({}), &actor("8").with_ip("10.0.0.2"))
            .allowed);
    }

    struct FailingCounters;

    impl CounterStore for FailingCounters {
        fn increment_below(
            &self,
            _key: &str,
            _limit: u64,
            _expires_at: DateTime<Utc>,
            _now: DateTime<Utc>,
        ) -> Result<CounterOutcome, CounterStoreError> {
            Err(CounterStoreError::Unavailable("down".into()))
        }
    }

    fn with_failing_counters(mode: StoreFailureMode) -> PolicyEvaluator {
        let clock = clock_at(10, 0);
        let config = GateConfig {
            store_failure_mode: mode,
            ..GateConfig::default()
        };
        PolicyEvaluator::new(
            Arc::new(PolicyStore::in_memory(clock.clone())),
            Arc::new(FailingCounters),
            Arc::new(InMemoryApprovalLedger::new()),
            clock,
            config,
        )
    }

    #[test]
    fn counter_failure_closed_denies() {
        let e = with_failing_counters(StoreFailureMode::Closed);
        install(&e, "posts.create", json!({"rate_limits": {"per_hour": 5}}));
        let v = e.decide("posts.create", None, &json!({}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::UnknownError);
        assert!(!v.details.contains("down"));
    }

    #[test]
    fn counter_failure_open_skips() {
        let e = with_failing_counters(StoreFailureMode::Open);
        install(&e, "posts.create", json!({"rate_limits": {"per_hour": 5}}));
        assert!(e.decide("posts.create", None, &json!({}), &actor("7")).allowed);
    }

    struct Entities(HashMap<u64, EntitySnapshot>);

    impl EntityLookup for Entities {
        fn type_and_status(&self, entity_id: EntityId) -> Option<EntitySnapshot> {
            self.0.get(&entity_id.get()).cloned()
        }
    }

    fn with_entities() -> PolicyEvaluator {
        let mut map = HashMap::new();
        map.insert(
            1,
            EntitySnapshot {
                entity_type: "page".into(),
                status: "draft".into(),
            },
        );
        map.insert(
            2,
            EntitySnapshot {
                entity_type: "post".into(),
                status: "publish".into(),
            },
        );
        map.insert(
            3,
            EntitySnapshot {
                entity_type: "post".into(),
                status: "draft".into(),
            },
        );
        evaluator(clock_at(10, 0)).with_entity_lookup(Arc::new(Entities(map)))
    }

    #[test]
    fn entity_rules() {
        let e = with_entities();
        install(
            &e,
            "posts.update",
            json!({"entity_rules": {
                "allowed_post_types": ["post"],
                "allowed_statuses": ["draft"]
            }}),
        );
        let a = actor("7");
        assert_eq!(
            e.decide("posts.update", Some(1), &json!({}), &a).reason,
            ReasonCode::PostTypeRestriction
        );
        assert_eq!(
            e.decide("posts.update", Some(2), &json!({}), &a).reason,
            ReasonCode::StatusRestriction
        );
        assert!(e.decide("posts.update", Some(3), &json!({}), &a).allowed);
        // Unknown, absent or non-positive entities skip the rule.
        assert!(e.decide("posts.update", Some(99), &json!({}), &a).allowed);
        assert!(e.decide("posts.update", None, &json!({}), &a).allowed);
        assert!(e.decide("posts.update", Some(-1), &json!({}), &a).allowed);
    }

    fn approval_policy() -> Value {
        json!({"approval_workflows": [{
            "name": "large_price_change",
            "conditions": [{"type": "field_numeric_greater", "field": "price", "value": 500}]
        }]})
    }

    #[test]
    fn approval_required_until_approved() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "products.update", approval_policy());
        let a = actor("7");

        let v = e.decide("products.update", Some(42), &json!({"price": 1000}), &a);
        assert_eq!(v.reason, ReasonCode::ApprovalRequired);
        assert_eq!(v.triggering_rule.as_deref(), Some("large_price_change"));

        let tool = ToolName::new("products.update").unwrap();
        e.approvals()
            .set_approval(&tool, EntityId::clamp(Some(42)), &a.id, true)
            .unwrap();
        assert!(e.decide("products.update", Some(42), &json!({"price": 1000}), &a).allowed);
        assert!(!e.decide("products.update", Some(43), &json!({"price": 1000}), &a).allowed);

        e.approvals()
            .revoke_approval(&tool, EntityId::clamp(Some(42)), &a.id)
            .unwrap();
        assert!(!e.decide("products.update", Some(42), &json!({"price": 1000}), &a).allowed);
    }

    #[test]
    fn workflow_not_fired_is_approved() {
        let e = evaluator(clock_at(10, 0));
        install(&e, "products.update", approval_policy());
        let v = e.decide("products.update", None, &json!({"price": 10}), &actor("7"));
        assert_eq!(v.reason, ReasonCode::Approved);
    }

    #[test]
    fn admin_bypass() {
        let admin = ActorId::new("1").unwrap();
        let e = evaluator(clock_at(10, 0))
            .with_capabilities(Arc::new(StaticCapabilities::with_admins([admin.clone()])));
        install(&e, "products.update", approval_policy());
        let ctx = ActorContext::new(admin);
        let v = e.decide("products.update", None, &json!({"price": 1000}), &ctx);
        assert!(v.allowed);
        assert_eq!(v.reason, ReasonCode::AdminBypass);
    }

    #[test]
    fn rate_limit_runs_before_content() {
        let e = evaluator(clock_at(10, 0));
        install(
            &e,
            "posts.create",
            json!({
                "rate_limits": {"per_hour": 1},
                "content_restrictions": {"blocked_terms": ["spam"]}
            }),
        );
        let fields = json!({"title": "spam"});
        assert_eq!(
            e.decide("posts.create", None, &fields, &actor("7")).reason,
            ReasonCode::BlockedTerm
        );
        assert_eq!(
            e.decide("posts.create", None, &fields, &actor("7")).reason,
            ReasonCode::RateLimitExceeded
        );
    }

    #[test]
    fn string_fields_paths() {
        let fields = json!({"a": "x", "b": {"c": "y"}, "d": ["z", 1]});
        let paths: Vec<String> = string_fields(&fields).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a", "b.c", "d.0"]);
    }
}
