//! Domain primitive types used across the hostlink workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PLACEHOLDER_MODULE_PATH, PLACEHOLDER_PARENT_PID};

/// Identifier of a monitored process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Wraps a raw pid.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// Returns the raw pid.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a thread inside a monitored process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Wraps a raw thread id.
    #[must_use]
    pub const fn new(tid: u32) -> Self {
        Self(tid)
    }

    /// Returns the raw thread id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ThreadId {
    fn from(tid: u32) -> Self {
        Self(tid)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single argument or return value captured at the call site.
///
/// The set is closed: the wire codec handles exactly these variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// Absent or null pointer value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer; only values up to `i64::MAX` are representable.
    UInt(u64),
    /// UTF-8 string.
    Str(String),
    /// Raw binary blob.
    Bytes(Vec<u8>),
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

const fn default_success() -> bool {
    true
}

/// One intercepted call, as produced by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEvent {
    /// Process that made the call.
    pub pid: ProcessId,
    /// Thread that made the call.
    pub tid: ThreadId,
    /// Name of the intercepted API.
    pub api: String,
    /// Value returned by the API.
    pub retval: ArgValue,
    /// Whether the call succeeded.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Argument values in call order.
    #[serde(default)]
    pub args: Vec<ArgValue>,
    /// Milliseconds since the process was launched.
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ApiEvent {
    /// Creates a successful event with zero elapsed time.
    pub fn new(
        pid: u32,
        tid: u32,
        api: impl Into<String>,
        retval: impl Into<ArgValue>,
        args: Vec<ArgValue>,
    ) -> Self {
        Self {
            pid: ProcessId::new(pid),
            tid: ThreadId::new(tid),
            api: api.into(),
            retval: retval.into(),
            success: true,
            args,
            elapsed_ms: 0,
        }
    }

    /// Sets the call outcome reported by the source.
    #[must_use]
    pub const fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Sets the time since process launch reported by the source.
    #[must_use]
    pub const fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Number of captured arguments.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

/// Metadata describing a monitored process, sent in the connection handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// The monitored process.
    pub pid: ProcessId,
    /// Its parent process.
    pub parent_pid: u32,
    /// Path of the main module.
    pub module_path: String,
    /// 64-bit process start time, sent as two 32-bit words.
    pub start_time: u64,
}

impl ProcessInfo {
    /// Metadata used when the event source never announced the process.
    #[must_use]
    pub fn placeholder(pid: ProcessId) -> Self {
        Self {
            pid,
            parent_pid: PLACEHOLDER_PARENT_PID,
            module_path: PLACEHOLDER_MODULE_PATH.to_owned(),
            start_time: 0,
        }
    }

    /// Low 32 bits of the start time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn time_low(&self) -> u32 {
        self.start_time as u32
    }

    /// High 32 bits of the start time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn time_high(&self) -> u32 {
        (self.start_time >> 32) as u32
    }
}

/// When a connection receives an API's description record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionPolicy {
    /// Describe each API once, before its first call on the connection.
    #[default]
    OncePerConnection,
    /// Re-send the description before every call.
    EveryCall,
}

impl fmt::Display for DescriptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OncePerConnection => write!(f, "once_per_connection"),
            Self::EveryCall => write!(f, "every_call"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults_to_success_and_zero_time() {
        let ev = ApiEvent::new(100, 7, "open", 3, vec!["/tmp/x".into(), 0.into()]);
        assert!(ev.success);
        assert_eq!(ev.elapsed_ms, 0);
        assert_eq!(ev.arg_count(), 2);
    }

    #[test]
    fn event_parses_from_json_with_defaults() {
        let ev: ApiEvent = serde_json::from_str(
            r#"{"pid":100,"tid":7,"api":"open","retval":3,"args":["/tmp/x",0,null,true]}"#,
        )
        .unwrap();
        assert_eq!(ev.pid, ProcessId::new(100));
        assert!(ev.success);
        assert_eq!(
            ev.args,
            vec![
                ArgValue::Str("/tmp/x".into()),
                ArgValue::Int(0),
                ArgValue::Null,
                ArgValue::Bool(true),
            ]
        );
    }

    #[test]
    fn large_unsigned_values_stay_unsigned() {
        let v: ArgValue = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(v, ArgValue::UInt(u64::MAX));
    }

    #[test]
    fn float_arguments_are_rejected() {
        let r: std::result::Result<ArgValue, _> = serde_json::from_str("1.5");
        assert!(r.is_err());
    }

    #[test]
    fn start_time_splits_into_words() {
        let info = ProcessInfo {
            start_time: 0x0000_0002_0000_0001,
            ..ProcessInfo::placeholder(ProcessId::new(1))
        };
        assert_eq!(info.time_low(), 1);
        assert_eq!(info.time_high(), 2);
    }

    #[test]
    fn placeholder_process_uses_defaults() {
        let info = ProcessInfo::placeholder(ProcessId::new(42));
        assert_eq!(info.parent_pid, 1);
        assert_eq!(info.module_path, "dummy");
        assert_eq!(info.start_time, 0);
    }

    #[test]
    fn policy_uses_snake_case_names() {
        let p: DescriptionPolicy = serde_json::from_str(r#""every_call""#).unwrap();
        assert_eq!(p, DescriptionPolicy::EveryCall);
        assert_eq!(DescriptionPolicy::default().to_string(), "once_per_connection");
    }
}
