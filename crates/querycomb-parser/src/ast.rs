//! AST types for combiner configurations, slot conditions, and time formats.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Lifecycle slots
// =============================================================================

/// One of the four lifecycle condition slots.
///
/// The declaration order is the evaluation order: the first slot whose
/// condition holds decides the action for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Catch,
    Prolong,
    Dump,
    Release,
}

impl SlotKind {
    /// All slots in evaluation order.
    pub const ALL: [SlotKind; 4] = [
        SlotKind::Catch,
        SlotKind::Prolong,
        SlotKind::Dump,
        SlotKind::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Catch => "catch",
            SlotKind::Prolong => "prolong",
            SlotKind::Dump => "dump",
            SlotKind::Release => "release",
        }
    }

    /// Whether `replace` and `time` options are accepted in this slot.
    pub fn transforms_record(&self) -> bool {
        matches!(self, SlotKind::Catch | SlotKind::Dump)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Condition expressions
// =============================================================================

/// Parsed slot condition.
///
/// Binary connectives of the same kind are flattened, so `a and b and c`
/// becomes a single `And` with three children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConditionExpr {
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    Xor(Box<ConditionExpr>, Box<ConditionExpr>),
    Not(Box<ConditionExpr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// A bare operand used as a boolean (`nil`/`false` are falsy).
    Truthy(Operand),
}

impl ConditionExpr {
    /// Field identifiers referenced by this expression, in order of first
    /// appearance, without duplicates.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            ConditionExpr::And(args) | ConditionExpr::Or(args) => {
                for arg in args {
                    arg.collect_fields(out);
                }
            }
            ConditionExpr::Xor(lhs, rhs) => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            ConditionExpr::Not(inner) => inner.collect_fields(out),
            ConditionExpr::Compare { left, right, .. } => {
                left.collect_field(out);
                right.collect_field(out);
            }
            ConditionExpr::Truthy(operand) => operand.collect_field(out),
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::And(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" and "))
            }
            ConditionExpr::Or(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" or "))
            }
            ConditionExpr::Xor(lhs, rhs) => write!(f, "({lhs} xor {rhs})"),
            ConditionExpr::Not(arg) => write!(f, "not {arg}"),
            ConditionExpr::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            ConditionExpr::Truthy(operand) => write!(f, "{operand}"),
        }
    }
}

/// One side of a comparison: a record field or a literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    Field(String),
    Literal(Literal),
}

impl Operand {
    fn collect_field(&self, out: &mut Vec<String>) {
        if let Operand::Field(name) = self
            && !out.iter().any(|f| f == name)
        {
            out.push(name.clone());
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(name) => write!(f, "{name}"),
            Operand::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

/// A literal value in a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => write!(f, "nil"),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `=~`: the left side matches the regex literal on the right.
    Matches,
    /// `!~`: the left side does not match the regex literal on the right.
    NotMatches,
}

impl CompareOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "=~" => Some(CompareOp::Matches),
            "!~" => Some(CompareOp::NotMatches),
            _ => None,
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, CompareOp::Matches | CompareOp::NotMatches)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Matches => "=~",
            CompareOp::NotMatches => "!~",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Time formats
// =============================================================================

/// How an event timestamp is rendered into a slot's `time` field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// `$time`: epoch seconds as an integer.
    #[default]
    Epoch,
    /// `string($time)`: epoch seconds as a string.
    EpochString,
    /// `millis($time)`: epoch milliseconds as an integer.
    EpochMillis,
    /// `iso8601($time)`: RFC 3339 text in UTC.
    Iso8601,
    /// `strftime($time, "...")`: UTC text in a strftime format.
    Strftime(String),
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeFormat::Epoch => write!(f, "$time"),
            TimeFormat::EpochString => write!(f, "string($time)"),
            TimeFormat::EpochMillis => write!(f, "millis($time)"),
            TimeFormat::Iso8601 => write!(f, "iso8601($time)"),
            TimeFormat::Strftime(fmt_str) => write!(f, "strftime($time, {fmt_str:?})"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// A `src => dst` field rename applied by `catch` and `dump`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceRule {
    pub from: String,
    pub to: String,
}

/// A configured lifecycle slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotConfig {
    pub kind: SlotKind,
    /// The condition text as written in the configuration.
    pub source: String,
    pub condition: ConditionExpr,
    /// Field renames, in configured order. Always empty for prolong/release.
    pub replace: Vec<ReplaceRule>,
    /// Destination field for the formatted event time.
    pub time_key: Option<String>,
}

/// Which store implementation holds session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Connection settings for the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub db_index: u32,
    /// Extra attempts for a transient store failure.
    pub retry: u32,
}

impl StoreSettings {
    /// Connection URL in `redis://host:port/db` form.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db_index)
    }
}

/// A fully parsed and validated combiner configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinerConfig {
    pub store: StoreSettings,
    pub key_prefix: String,
    /// Fields joined into the session key, in order.
    pub identify: Vec<String>,
    pub ttl_secs: u64,
    /// Maximum number of tracked sessions kept by the reaper.
    pub buffer_size: usize,
    pub continuous_dump: bool,
    pub time_format: TimeFormat,
    pub flush_interval_secs: u64,
    pub remove_interval_secs: u64,
    /// Tag attached to every emitted record.
    pub tag: String,
    /// Record fields consulted for the event time by ingestion front ends.
    pub timestamp_fields: Vec<String>,
    pub catch: SlotConfig,
    pub prolong: Option<SlotConfig>,
    pub dump: SlotConfig,
    pub release: Option<SlotConfig>,
}

impl CombinerConfig {
    /// Configured slots in evaluation order.
    pub fn slots(&self) -> impl Iterator<Item = &SlotConfig> {
        [
            Some(&self.catch),
            self.prolong.as_ref(),
            Some(&self.dump),
            self.release.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}
