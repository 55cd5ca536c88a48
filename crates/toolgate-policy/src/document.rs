//! # Policy Documents
//!
//! The per-tool configuration that every decision is evaluated against.
//! All sections are optional; an absent section means "no restriction of
//! that kind".
//!
//! Documents are typed and validated at load time. [`PolicyDocument::compile`]
//! is the only way to produce a [`CompiledPolicy`], so a policy with an
//! out-of-range hour, a malformed `HH:MM` or an invalid regex can never
//! become active.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// A complete policy document for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// Windowed invocation limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimits>,
    /// Allowed hours/days and blackout windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_windows: Option<TimeWindows>,
    /// Blocked terms and patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_restrictions: Option<ContentRestrictions>,
    /// Allowed entity types and statuses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_rules: Option<EntityRules>,
    /// Human-approval workflows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_workflows: Option<Vec<ApprovalWorkflow>>,
}

/// Invocation limits per window. A missing limit is not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimits {
    /// Calls per actor per clock hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_hour: Option<u64>,
    /// Calls per actor per UTC day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_day: Option<u64>,
    /// Calls per client IP per clock hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_ip_hour: Option<u64>,
}

/// Time-of-day and day-of-week restrictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindows {
    /// Hours (0-23) during which the tool may run. Empty means any hour.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_hours: Vec<u32>,
    /// ISO weekdays (1 = Monday .. 7 = Sunday). Empty means any day.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_days: Vec<u32>,
    /// Ranges during which the tool is always denied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blackout_windows: Vec<BlackoutWindow>,
}

/// A day-and-time range during which an action is always denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlackoutWindow {
    /// Start time, `HH:MM`, inclusive.
    pub start: String,
    /// End time, `HH:MM`, exclusive. Earlier than `start` crosses midnight.
    pub end: String,
    /// ISO weekdays the window starts on. Empty means every day.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<u32>,
}

/// Severity attached to a blocked term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Should be reviewed.
    Medium,
    /// Must not be published.
    High,
    /// Legal or safety exposure.
    Critical,
}

impl Severity {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content filters applied to every string-valued request field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentRestrictions {
    /// Case-insensitive substrings that deny the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_terms: Vec<String>,
    /// Regular expressions that deny the request. `/pattern/flags` form is
    /// accepted with `i`, `m`, `s` and `x` flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_patterns: Vec<String>,
    /// Severity per blocked term, reported in the verdict detail.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub severity_levels: BTreeMap<String, Severity>,
}

/// Allowed entity types and statuses for tools that act on an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRules {
    /// Entity (post) types the tool may touch. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_post_types: Vec<String>,
    /// Entity statuses the tool may touch. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_statuses: Vec<String>,
}

/// A named rule set whose trigger conditions require a recorded approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    /// Workflow name, reported in the verdict.
    pub name: String,
    /// The workflow fires if any condition holds.
    #[serde(default)]
    pub conditions: Vec<ApprovalCondition>,
}

/// One trigger condition of an approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalCondition {
    /// The field equals `value` exactly.
    FieldEquals {
        /// Field name or dotted path.
        field: String,
        /// Expected value.
        value: serde_json::Value,
    },
    /// The field contains `value`, case-insensitively.
    FieldContains {
        /// Field name or dotted path.
        field: String,
        /// Substring to look for.
        value: String,
    },
    /// The field's character length exceeds `value`.
    FieldLengthGreater {
        /// Field name or dotted path.
        field: String,
        /// Length threshold.
        #[serde(deserialize_with = "lenient_u64")]
        value: u64,
    },
    /// The field is numeric and exceeds `value`.
    FieldNumericGreater {
        /// Field name or dotted path.
        field: String,
        /// Numeric threshold.
        #[serde(deserialize_with = "lenient_f64")]
        value: f64,
    },
    /// The invoked tool is `value`.
    ToolEquals {
        /// Tool name, canonicalized before comparison.
        value: String,
    },
}

impl ApprovalCondition {
    /// The condition's type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FieldEquals { .. } => "field_equals",
            Self::FieldContains { .. } => "field_contains",
            Self::FieldLengthGreater { .. } => "field_length_greater",
            Self::FieldNumericGreater { .. } => "field_numeric_greater",
            Self::ToolEquals { .. } => "tool_equals",
        }
    }

    /// The field this condition reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::FieldEquals { field, .. }
            | Self::FieldContains { field, .. }
            | Self::FieldLengthGreater { field, .. }
            | Self::FieldNumericGreater { field, .. } => Some(field),
            Self::ToolEquals { .. } => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got \"{s}\""))),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
        NumberOrString::String(s) => s.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("expected a non-negative integer, got \"{s}\""))
        }),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single problem found while validating a policy document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyValidationError {
    /// `allowed_hours` entry outside 0-23.
    #[error("time_windows.allowed_hours: {0} is not an hour (0-23)")]
    InvalidHour(u32),

    /// Weekday outside 1-7.
    #[error("{field}: {value} is not a weekday (1 = Monday .. 7 = Sunday)")]
    InvalidDay {
        /// The offending field path.
        field: String,
        /// The rejected value.
        value: u32,
    },

    /// Clock time not in `HH:MM` form.
    #[error("{field}: \"{value}\" is not a valid HH:MM time")]
    InvalidClockTime {
        /// The offending field path.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// Blackout window with identical start and end.
    #[error("time_windows.blackout_windows[{0}]: start and end are equal")]
    EmptyBlackoutWindow(usize),

    /// Blank blocked term.
    #[error("content_restrictions.blocked_terms[{0}]: term is empty")]
    EmptyBlockedTerm(usize),

    /// Regex failed to compile.
    #[error("content_restrictions.blocked_patterns: \"{pattern}\" is invalid: {reason}")]
    InvalidPattern {
        /// The pattern as written in the document.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// Workflow with a blank name.
    #[error("approval_workflows[{0}]: name is empty")]
    EmptyWorkflowName(usize),

    /// Workflow with no conditions never fires.
    #[error("approval_workflows[{0}] ({1}): has no conditions")]
    WorkflowWithoutConditions(usize, String),

    /// Condition with a blank field name.
    #[error("approval_workflows[{workflow}].conditions[{condition}]: {kind} requires a field")]
    MissingConditionField {
        /// Workflow index.
        workflow: usize,
        /// Condition index.
        condition: usize,
        /// Condition type.
        kind: &'static str,
    },
}

/// A document that failed validation, with every problem found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid policy document: {}", join_errors(.errors))]
pub struct InvalidPolicy {
    /// All problems, in document order.
    pub errors: Vec<PolicyValidationError>,
}

fn join_errors(errors: &[PolicyValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors parsing a policy document from text.
#[derive(Error, Debug)]
pub enum PolicyParseError {
    /// The text is not a well-formed policy document.
    #[error("policy document does not match the schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// The document parsed but failed validation.
    #[error(transparent)]
    Invalid(#[from] InvalidPolicy),
}

impl PolicyDocument {
    /// Parse and validate a JSON policy document.
    pub fn from_json_str(text: &str) -> Result<Self, PolicyParseError> {
        let doc: Self = serde_json::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Parse and validate a policy document from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PolicyParseError> {
        let doc: Self = serde_json::from_value(value)?;
        doc.validate()?;
        Ok(doc)
    }

    /// The document as a JSON object (absent sections omitted).
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Whether the document restricts nothing at all.
    pub fn is_unrestricted(&self) -> bool {
        self == &Self::default()
    }

    /// Validate the document, returning every problem found.
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        let mut errors = Vec::new();

        if let Some(tw) = &self.time_windows {
            for &h in &tw.allowed_hours {
                if h > 23 {
                    errors.push(PolicyValidationError::InvalidHour(h));
                }
            }
            check_days(&tw.allowed_days, "time_windows.allowed_days", &mut errors);
            for (i, w) in tw.blackout_windows.iter().enumerate() {
                let start = parse_clock(&w.start);
                let end = parse_clock(&w.end);
                if start.is_none() {
                    errors.push(PolicyValidationError::InvalidClockTime {
                        field: format!("time_windows.blackout_windows[{i}].start"),
                        value: w.start.clone(),
                    });
                }
                if end.is_none() {
                    errors.push(PolicyValidationError::InvalidClockTime {
                        field: format!("time_windows.blackout_windows[{i}].end"),
                        value: w.end.clone(),
                    });
                }
                if start.is_some() && start == end {
                    errors.push(PolicyValidationError::EmptyBlackoutWindow(i));
                }
                check_days(
                    &w.days,
                    &format!("time_windows.blackout_windows[{i}].days"),
                    &mut errors,
                );
            }
        }

        if let Some(cr) = &self.content_restrictions {
            for (i, term) in cr.blocked_terms.iter().enumerate() {
                if term.trim().is_empty() {
                    errors.push(PolicyValidationError::EmptyBlockedTerm(i));
                }
            }
            for pattern in &cr.blocked_patterns {
                if let Err(e) = compile_pattern(pattern) {
                    errors.push(PolicyValidationError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(workflows) = &self.approval_workflows {
            for (wi, wf) in workflows.iter().enumerate() {
                if wf.name.trim().is_empty() {
                    errors.push(PolicyValidationError::EmptyWorkflowName(wi));
                }
                if wf.conditions.is_empty() {
                    errors.push(PolicyValidationError::WorkflowWithoutConditions(
                        wi,
                        wf.name.clone(),
                    ));
                }
                for (ci, cond) in wf.conditions.iter().enumerate() {
                    if cond.field().is_some_and(|f| f.trim().is_empty()) {
                        errors.push(PolicyValidationError::MissingConditionField {
                            workflow: wi,
                            condition: ci,
                            kind: cond.kind(),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(InvalidPolicy { errors })
        }
    }

    /// Validate and pre-build everything evaluation needs.
    pub fn compile(&self) -> Result<CompiledPolicy, InvalidPolicy> {
        self.validate()?;

        let mut blocked_terms = Vec::new();
        let mut blocked_patterns = Vec::new();
        if let Some(cr) = &self.content_restrictions {
            for term in &cr.blocked_terms {
                let lowered = term.trim().to_lowercase();
                let severity = cr
                    .severity_levels
                    .iter()
                    .find(|(k, _)| k.trim().to_lowercase() == lowered)
                    .map(|(_, s)| *s);
                blocked_terms.push(BlockedTerm {
                    term: term.trim().to_string(),
                    lowered,
                    severity,
                });
            }
            for pattern in &cr.blocked_patterns {
                // Validation above guarantees this compiles.
                if let Ok(regex) = compile_pattern(pattern) {
                    blocked_patterns.push(BlockedPattern {
                        source: pattern.clone(),
                        regex,
                    });
                }
            }
        }

        let blackout_windows = self
            .time_windows
            .iter()
            .flat_map(|tw| tw.blackout_windows.iter())
            .filter_map(|w| {
                Some(ParsedBlackout {
                    start_minute: parse_clock(&w.start)?,
                    end_minute: parse_clock(&w.end)?,
                    days: w.days.clone(),
                    label: format!("{}-{}", w.start, w.end),
                })
            })
            .collect();

        Ok(CompiledPolicy {
            document: self.clone(),
            blocked_terms,
            blocked_patterns,
            blackout_windows,
        })
    }
}

fn check_days(days: &[u32], field: &str, errors: &mut Vec<PolicyValidationError>) {
    for &d in days {
        if !(1..=7).contains(&d) {
            errors.push(PolicyValidationError::InvalidDay {
                field: field.to_string(),
                value: d,
            });
        }
    }
}

/// Parse `HH:MM` into minutes since midnight.
pub fn parse_clock(value: &str) -> Option<u32> {
    let (h, m) = value.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Compile a blocked pattern, accepting `/pattern/flags` delimiters.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let trimmed = pattern.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        if let Some(close) = rest.rfind('/') {
            let body = &rest[..close];
            let flags = &rest[close + 1..];
            if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u')) {
                let inline: String = flags.chars().filter(|c| *c != 'u').collect();
                let source = if inline.is_empty() {
                    body.to_string()
                } else {
                    format!("(?{inline}){body}")
                };
                return Regex::new(&source);
            }
        }
    }
    Regex::new(trimmed)
}

// ---------------------------------------------------------------------------
// CompiledPolicy
// ---------------------------------------------------------------------------

/// A blocked term with its pre-lowered form and severity.
#[derive(Debug, Clone)]
pub struct BlockedTerm {
    /// The term as configured.
    pub term: String,
    /// Lowercased form used for matching.
    pub lowered: String,
    /// Configured severity, if any.
    pub severity: Option<Severity>,
}

/// A compiled blocked pattern.
#[derive(Debug, Clone)]
pub struct BlockedPattern {
    /// The pattern as configured.
    pub source: String,
    /// The compiled expression.
    pub regex: Regex,
}

/// A blackout window with parsed bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlackout {
    /// Inclusive start, minutes since midnight.
    pub start_minute: u32,
    /// Exclusive end, minutes since midnight.
    pub end_minute: u32,
    /// ISO weekdays the window starts on; empty means every day.
    pub days: Vec<u32>,
    /// `HH:MM-HH:MM` label for verdict details.
    pub label: String,
}

impl ParsedBlackout {
    /// Whether the window covers `minute` on ISO weekday `day`.
    ///
    /// A window that crosses midnight covers the early-morning part on the
    /// day after each configured start day.
    pub fn covers(&self, day: u32, minute: u32) -> bool {
        let applies_to = |d: u32| self.days.is_empty() || self.days.contains(&d);
        if self.start_minute < self.end_minute {
            applies_to(day) && minute >= self.start_minute && minute < self.end_minute
        } else if minute >= self.start_minute {
            applies_to(day)
        } else if minute < self.end_minute {
            let previous = if day == 1 { 7 } else { day - 1 };
            applies_to(previous)
        } else {
            false
        }
    }
}

/// A validated document with pre-built matchers.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    /// The source document.
    pub document: PolicyDocument,
    /// Blocked terms, in document order.
    pub blocked_terms: Vec<BlockedTerm>,
    /// Blocked patterns, in document order.
    pub blocked_patterns: Vec<BlockedPattern>,
    /// Blackout windows, in document order.
    pub blackout_windows: Vec<ParsedBlackout>,
}
