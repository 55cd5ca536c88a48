//! # Evaluate Subcommand
//!
//! Runs decisions against a policy file with an in-memory store, so a
//! policy author can see what an agent request would get before the policy
//! ships. The verdict is printed as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde_json::Value;
use toolgate_core::{
    ActorContext, ActorId, Clock, EntityId, FixedClock, GateConfig, SystemClock, ToolName,
};
use toolgate_policy::{
    EntityLookup, EntitySnapshot, PolicyEvaluator, PolicyVerdict, StaticCapabilities,
};

use crate::load_policy_file;

/// Arguments for the `toolgate evaluate` subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Policy document for the tool.
    #[arg(long, value_name = "PATH")]
    pub policy: PathBuf,

    /// Tool being invoked, e.g. `posts.create`.
    #[arg(long)]
    pub tool: String,

    /// Request fields as a JSON object.
    #[arg(long, default_value = "{}")]
    pub fields: String,

    /// Requesting actor.
    #[arg(long, default_value = "cli")]
    pub actor: String,

    /// Client IP address.
    #[arg(long)]
    pub ip: Option<String>,

    /// Evaluate at this RFC 3339 instant instead of now.
    #[arg(long, value_name = "RFC3339")]
    pub at: Option<String>,

    /// Target entity id.
    #[arg(long)]
    pub entity_id: Option<i64>,

    /// Type of the target entity, for entity rules.
    #[arg(long, requires = "entity_id")]
    pub entity_type: Option<String>,

    /// Status of the target entity, for entity rules.
    #[arg(long, requires = "entity_id")]
    pub entity_status: Option<String>,

    /// Grant the actor admin bypass.
    #[arg(long)]
    pub admin: bool,

    /// Record an approval for the actor before evaluating.
    #[arg(long)]
    pub approved: bool,

    /// Evaluate the same request this many times (exercises rate limits).
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

struct SingleEntity {
    id: i64,
    snapshot: EntitySnapshot,
}

impl EntityLookup for SingleEntity {
    fn type_and_status(&self, entity_id: EntityId) -> Option<EntitySnapshot> {
        (entity_id.get() == self.id as u64).then(|| self.snapshot.clone())
    }
}

/// Execute the evaluate subcommand.
///
/// Returns exit code: 0 if the last decision allowed the action, 1 if it
/// denied it.
pub fn run_evaluate(args: &EvaluateArgs, config: GateConfig) -> Result<u8> {
    let verdicts = evaluate(args, config)?;
    for verdict in &verdicts {
        println!(
            "{}",
            serde_json::to_string_pretty(verdict).context("failed to render verdict")?
        );
    }
    let allowed = verdicts.last().is_some_and(|v| v.allowed);
    Ok(u8::from(!allowed))
}

/// Run the configured decisions and return every verdict.
pub fn evaluate(args: &EvaluateArgs, config: GateConfig) -> Result<Vec<PolicyVerdict>> {
    let document = load_policy_file(&args.policy)?;
    let fields: Value = serde_json::from_str(&args.fields).context("--fields is not valid JSON")?;
    let actor_id = ActorId::new(args.actor.as_str()).context("--actor must not be empty")?;
    let tool = ToolName::new(&args.tool).context("--tool is not a valid tool name")?;

    let clock: Arc<dyn Clock> = match &args.at {
        Some(at) => {
            let at: DateTime<Utc> = DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("--at \"{at}\" is not an RFC 3339 timestamp"))?
                .with_timezone(&Utc);
            Arc::new(FixedClock::new(at))
        }
        None => Arc::new(SystemClock),
    };

    let mut evaluator = PolicyEvaluator::in_memory(clock, config);
    if args.admin {
        evaluator = evaluator
            .with_capabilities(Arc::new(StaticCapabilities::with_admins([actor_id.clone()])));
    }
    if let (Some(id), Some(entity_type), Some(status)) =
        (args.entity_id, &args.entity_type, &args.entity_status)
    {
        evaluator = evaluator.with_entity_lookup(Arc::new(SingleEntity {
            id,
            snapshot: EntitySnapshot {
                entity_type: entity_type.clone(),
                status: status.clone(),
            },
        }));
    }

    evaluator
        .store()
        .update_active(&tool, document)
        .context("policy document was rejected")?;
    if args.approved {
        evaluator
            .approvals()
            .set_approval(&tool, EntityId::clamp(args.entity_id), &actor_id, true)
            .context("failed to record approval")?;
    }

    let mut actor = ActorContext::new(actor_id);
    if let Some(ip) = &args.ip {
        actor = actor.with_ip(ip.clone());
    }

    let verdicts = (0..args.repeat.max(1))
        .map(|_| evaluator.decide(&args.tool, args.entity_id, &fields, &actor))
        .collect();
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use toolgate_policy::ReasonCode;

    fn policy(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    fn args(policy: &tempfile::NamedTempFile, tool: &str) -> EvaluateArgs {
        EvaluateArgs {
            policy: policy.path().to_path_buf(),
            tool: tool.to_string(),
            fields: "{}".to_string(),
            actor: "7".to_string(),
            ip: None,
            // A Monday.
            at: Some("2026-03-02T20:00:00Z".to_string()),
            entity_id: None,
            entity_type: None,
            entity_status: None,
            admin: false,
            approved: false,
            repeat: 1,
        }
    }

    #[test]
    fn outside_allowed_hours_exits_one() {
        let p = policy(
            r#"{"time_windows": {"allowed_hours": [9, 10, 11, 12, 13, 14, 15, 16, 17]}}"#,
        );
        let a = args(&p, "posts.create");
        let v = evaluate(&a, GateConfig::default()).unwrap();
        assert_eq!(v[0].reason, ReasonCode::TimeRestriction);
        assert_eq!(run_evaluate(&a, GateConfig::default()).unwrap(), 1);
    }

    #[test]
    fn unrestricted_policy_exits_zero() {
        let p = policy("{}");
        assert_eq!(run_evaluate(&args(&p, "posts.create"), GateConfig::default()).unwrap(), 0);
    }

    #[test]
    fn repeat_hits_rate_limit() {
        let p = policy(r#"{"rate_limits": {"per_hour": 2}}"#);
        let mut a = args(&p, "posts.create");
        a.repeat = 3;
        let v = evaluate(&a, GateConfig::default()).unwrap();
        assert!(v[0].allowed && v[1].allowed);
        assert_eq!(v[2].reason, ReasonCode::RateLimitExceeded);
        assert_eq!(v[2].details, "Rate limit exceeded for per_hour: 2/2");
    }

    #[test]
    fn approval_flags() {
        let p = policy(
            r#"{"approval_workflows": [{
                "name": "big",
                "conditions": [{"type": "field_numeric_greater", "field": "price", "value": 500}]
            }]}"#,
        );
        let mut a = args(&p, "products.update");
        a.fields = r#"{"price": 1000}"#.to_string();
        a.entity_id = Some(3);
        let reason = |a: &EvaluateArgs| evaluate(a, GateConfig::default()).unwrap()[0].reason;
        assert_eq!(reason(&a), ReasonCode::ApprovalRequired);

        a.approved = true;
        assert_eq!(reason(&a), ReasonCode::Approved);

        a.approved = false;
        a.admin = true;
        assert_eq!(reason(&a), ReasonCode::AdminBypass);
    }

    #[test]
    fn entity_flags_feed_entity_rules() {
        let p = policy(r#"{"entity_rules": {"allowed_statuses": ["draft"]}}"#);
        let mut a = args(&p, "posts.update");
        a.entity_id = Some(12);
        a.entity_type = Some("post".into());
        a.entity_status = Some("publish".into());
        let v = evaluate(&a, GateConfig::default()).unwrap();
        assert_eq!(v[0].reason, ReasonCode::StatusRestriction);
    }

    #[test]
    fn bad_inputs_are_errors() {
        let p = policy("{}");
        let mut a = args(&p, "posts.create");
        a.fields = "{not json".into();
        assert!(evaluate(&a, GateConfig::default()).is_err());

        let mut a = args(&p, "posts.create");
        a.at = Some("yesterday".into());
        assert!(evaluate(&a, GateConfig::default()).is_err());

        let a = args(&p, "%%%");
        assert!(evaluate(&a, GateConfig::default()).is_err());
    }
}
