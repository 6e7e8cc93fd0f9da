//! Operation records for test histories
//!
//! Every client invocation and completion, and every nemesis event, is an
//! [`Op`]. Workers append their own ops to the current history; the nemesis
//! fans its ops into every active history.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Logical process identity
///
/// A process is a single-threaded client identity, distinct from any OS
/// thread. Worker ids start at `0..concurrency` and are retired to
/// `old + concurrency` after an indeterminate outcome, so ids stay globally
/// unique across the life of a test while the live set stays at
/// `concurrency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Process {
    /// A logical client, identified by worker id
    Worker(u64),
    /// The fault-injection actor
    Nemesis,
}

impl Process {
    /// Mint the successor id after an indeterminate outcome
    ///
    /// The nemesis identity is never retired.
    pub fn retire(self, concurrency: u64) -> Self {
        match self {
            Process::Worker(id) => Process::Worker(id + concurrency),
            Process::Nemesis => Process::Nemesis,
        }
    }

    /// Whether this is the nemesis identity
    pub fn is_nemesis(&self) -> bool {
        matches!(self, Process::Nemesis)
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Worker(id) => write!(f, "{}", id),
            Process::Nemesis => write!(f, "nemesis"),
        }
    }
}

impl FromStr for Process {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("nemesis") {
            Ok(Process::Nemesis)
        } else {
            let id = s
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("Invalid process: {}", s))?;
            Ok(Process::Worker(id))
        }
    }
}

// Histories serialize processes as the bare worker id or the string
// "nemesis", matching the analysis tools downstream.
impl Serialize for Process {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Process::Worker(id) => serializer.serialize_u64(*id),
            Process::Nemesis => serializer.serialize_str("nemesis"),
        }
    }
}

impl<'de> Deserialize<'de> for Process {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProcessVisitor;

        impl Visitor<'_> for ProcessVisitor {
            type Value = Process;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a worker id or \"nemesis\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Process, E> {
                Ok(Process::Worker(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Process, E> {
                if v < 0 {
                    return Err(E::custom(format!("negative process id: {}", v)));
                }
                Ok(Process::Worker(v as u64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Process, E> {
                Process::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ProcessVisitor)
    }
}

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// An invocation: the effect was requested
    Invoke,
    /// The effect definitely happened
    Ok,
    /// The effect definitely did not happen
    Fail,
    /// Indeterminate: the system neither confirmed nor denied the effect
    Info,
}

impl OpKind {
    /// Whether this kind closes an invocation
    pub fn is_completion(&self) -> bool {
        !matches!(self, OpKind::Invoke)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Invoke => "invoke",
            OpKind::Ok => "ok",
            OpKind::Fail => "fail",
            OpKind::Info => "info",
        };
        write!(f, "{}", s)
    }
}

/// A single history record
///
/// Generators produce ops carrying only `f` and `value`; the worker (or the
/// nemesis supervisor) stamps `process`, `kind` and `time` before the record
/// is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Logical process this record belongs to
    pub process: Process,
    /// Record type
    #[serde(rename = "type")]
    pub kind: OpKind,
    /// Function name
    pub f: String,
    /// Operation argument or result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Monotonic nanoseconds since run start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    /// Error description for fail/info records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Position in the final history, assigned after the case ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

impl Op {
    /// Create an invocation payload
    ///
    /// The process is a placeholder until the worker stamps its own.
    pub fn op(f: impl Into<String>) -> Self {
        Self {
            process: Process::Worker(0),
            kind: OpKind::Invoke,
            f: f.into(),
            value: None,
            time: None,
            error: None,
            index: None,
        }
    }

    /// Attach a value
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Override the owning process
    pub fn with_process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    /// Override the record type
    pub fn with_kind(mut self, kind: OpKind) -> Self {
        self.kind = kind;
        self
    }

    /// Stamp the monotonic time
    pub fn stamped(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    /// Attach an error description
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Derive a completion record from this invocation
    ///
    /// Preserves `process`, `f` and `value`; the caller stamps the time.
    pub fn complete(&self, kind: OpKind) -> Self {
        Self {
            process: self.process,
            kind,
            f: self.f.clone(),
            value: self.value.clone(),
            time: None,
            error: None,
            index: None,
        }
    }

    /// Whether a completion record closes this invocation
    ///
    /// Completions must preserve `process` and `f`.
    pub fn completes(&self, completion: &Op) -> bool {
        completion.kind.is_completion()
            && completion.process == self.process
            && completion.f == self.f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retire_formula() {
        assert_eq!(Process::Worker(0).retire(5), Process::Worker(5));
        assert_eq!(Process::Worker(3).retire(5), Process::Worker(8));
        assert_eq!(Process::Worker(8).retire(5), Process::Worker(13));
        assert_eq!(Process::Nemesis.retire(5), Process::Nemesis);
    }

    #[test]
    fn test_process_display_and_parse() {
        assert_eq!(Process::Worker(7).to_string(), "7");
        assert_eq!(Process::Nemesis.to_string(), "nemesis");

        assert_eq!("7".parse::<Process>().unwrap(), Process::Worker(7));
        assert_eq!("nemesis".parse::<Process>().unwrap(), Process::Nemesis);
        assert_eq!("NEMESIS".parse::<Process>().unwrap(), Process::Nemesis);
        assert!("minus-one".parse::<Process>().is_err());
    }

    #[test]
    fn test_process_serialization() {
        assert_eq!(serde_json::to_string(&Process::Worker(2)).unwrap(), "2");
        assert_eq!(
            serde_json::to_string(&Process::Nemesis).unwrap(),
            "\"nemesis\""
        );

        let p: Process = serde_json::from_str("2").unwrap();
        assert_eq!(p, Process::Worker(2));
        let p: Process = serde_json::from_str("\"nemesis\"").unwrap();
        assert_eq!(p, Process::Nemesis);
    }

    #[test]
    fn test_op_serialization_uses_type_field() {
        let op = Op::op("read")
            .with_process(Process::Worker(1))
            .stamped(42);

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "invoke");
        assert_eq!(json["process"], 1);
        assert_eq!(json["f"], "read");
        assert_eq!(json["time"], 42);
        // Absent optionals are elided entirely
        assert!(json.get("value").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("index").is_none());

        let back: Op = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_complete_preserves_identity() {
        let inv = Op::op("write")
            .with_value(json!(3))
            .with_process(Process::Worker(4))
            .stamped(100);

        let done = inv.complete(OpKind::Ok).stamped(200);
        assert_eq!(done.process, Process::Worker(4));
        assert_eq!(done.f, "write");
        assert_eq!(done.value, Some(json!(3)));
        assert_eq!(done.kind, OpKind::Ok);
        assert!(inv.completes(&done));
    }

    #[test]
    fn test_completes_rejects_mismatches() {
        let inv = Op::op("read").with_process(Process::Worker(0));

        // Wrong process
        let other = inv.complete(OpKind::Ok).with_process(Process::Worker(1));
        assert!(!inv.completes(&other));

        // Wrong f
        let mut other = inv.complete(OpKind::Fail);
        other.f = "write".to_string();
        assert!(!inv.completes(&other));

        // An invocation never completes anything
        let other = inv.complete(OpKind::Invoke);
        assert!(!inv.completes(&other));
    }

    #[test]
    fn test_nemesis_records_are_info() {
        let op = Op::op("partition")
            .with_process(Process::Nemesis)
            .with_kind(OpKind::Info)
            .with_error("crashed: network unreachable");

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["process"], "nemesis");
        assert_eq!(json["type"], "info");
        assert_eq!(json["error"], "crashed: network unreachable");
    }
}
