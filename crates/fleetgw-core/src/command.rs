//! Commands from the control plane and the result of servicing them.
//!
//! A [`Command`] is immutable once parsed; validation helpers on
//! [`CommandResult`] read field values and report problems as human-readable
//! error strings rather than mutating the command. The only coercion applied
//! is integer-boolean normalization (`0`/`1` treated as `false`/`true`)
//! during [`CommandResult::validate_boolean`].

use serde::Deserialize;

/// A single command field value.
///
/// The control plane serializes field values as plain JSON scalars, so this
/// deserializes untagged: strings, integers, and booleans are the only
/// shapes the gateway accepts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// String value
    Str(String),
}

impl FieldValue {
    /// String content, if this is a string field.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer content, if this is an integer field.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean content, coercing the integers `0` and `1`.
    ///
    /// Some control-plane UIs encode booleans as integer toggles; the
    /// gateway normalizes them here so downstream payload builders only
    /// ever see real booleans.
    pub fn as_bool_lenient(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Int(0) => Some(false),
            FieldValue::Int(1) => Some(true),
            _ => None,
        }
    }
}

/// One named field of a command, in wire order.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandField {
    /// Field name, unique within one command
    pub name: String,
    /// Field value
    pub value: FieldValue,
}

/// An inbound request from the control plane.
///
/// Wire shape: `{"id", "type", "path", "fields": [{"name", "value"}, ...]}`.
/// The last dotted segment of `path` names the target subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    /// Opaque correlation token, vehicle-unique per session
    pub id: i64,
    /// String tag selecting behavior
    #[serde(rename = "type")]
    pub command_type: String,
    /// Dotted hierarchical address; last segment is the target subsystem
    pub path: String,
    /// Ordered fields; names are unique within one command
    #[serde(default)]
    pub fields: Vec<CommandField>,
}

impl Command {
    /// Build a command directly (used by tests and tooling; inbound commands
    /// normally arrive via deserialization).
    pub fn new(
        id: i64,
        command_type: impl Into<String>,
        path: impl Into<String>,
        fields: Vec<(&str, FieldValue)>,
    ) -> Self {
        Self {
            id,
            command_type: command_type.into(),
            path: path.into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| CommandField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }
    }

    /// The target subsystem: the last dotted segment of `path`.
    ///
    /// ```
    /// # use fleetgw_core::Command;
    /// let cmd = Command::new(1, "telemetry", "mission.sat-1.eps", vec![]);
    /// assert_eq!(cmd.subsystem(), "eps");
    /// ```
    pub fn subsystem(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Look up a field by name.
    ///
    /// If a command carries a duplicate name (a control-plane contract
    /// violation), the last occurrence wins.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}

/// Outcome of attempting to service a [`Command`].
///
/// Invariants: `sent` implies `errors` is empty and `payload` is non-empty;
/// `matched == false` means no behavior was found for the command type and
/// the router appends the generic unknown-command error before reporting.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// Was a behavior found for this command type
    pub matched: bool,
    /// Was a wire request actually transmitted
    pub sent: bool,
    /// Human-readable validation/routing errors, in order of detection
    pub errors: Vec<String>,
    /// The wire request body actually sent, or empty
    pub payload: String,
}

impl CommandResult {
    /// An empty result: not matched, not sent, no errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// A failed result carrying a single error.
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Record that a behavior was found for the command type.
    pub fn mark_matched(&mut self) {
        self.matched = true;
    }

    /// Record that the payload was transmitted.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// No errors accumulated so far.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Require `field` to be a non-empty string.
    pub fn validate_presence(&mut self, command: &Command, field: &str, error: &str) {
        match command.field(field).and_then(FieldValue::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => self.errors.push(error.to_string()),
        }
    }

    /// Require `field` to be an integer in the half-open range `[start, end)`.
    pub fn validate_range(
        &mut self,
        command: &Command,
        field: &str,
        start: i64,
        end: i64,
        error: &str,
    ) {
        match command.field(field) {
            None => self.errors.push(format!("{field} is required")),
            Some(value) => match value.as_int() {
                None => self.errors.push(format!("{field} must be an integer")),
                Some(i) if i < start || i >= end => self.errors.push(error.to_string()),
                Some(_) => {}
            },
        }
    }

    /// Require `field` to be a boolean, accepting the integers `0`/`1`.
    ///
    /// Returns the coerced value so payload builders do not re-implement
    /// the coercion; `None` means an error was appended.
    pub fn validate_boolean(&mut self, command: &Command, field: &str, error: &str) -> Option<bool> {
        match command.field(field).and_then(FieldValue::as_bool_lenient) {
            Some(b) => Some(b),
            None => {
                self.errors.push(error.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn command_with(fields: Vec<(&str, FieldValue)>) -> Command {
        Command::new(7, "test", "mission.sat.eps", fields)
    }

    #[test]
    fn parses_inbound_wire_shape() {
        let cmd: Command = serde_json::from_value(serde_json::json!({
            "id": 42,
            "type": "telemetry",
            "path": "x.y.telemetry",
            "fields": [
                {"name": "limit", "value": 5},
                {"name": "subsystem", "value": "eps"}
            ]
        }))
        .unwrap();
        assert_eq!(cmd.id, 42);
        assert_eq!(cmd.command_type, "telemetry");
        assert_eq!(cmd.subsystem(), "telemetry");
        assert_eq!(cmd.field("limit"), Some(&FieldValue::Int(5)));
        assert_eq!(cmd.field("subsystem"), Some(&FieldValue::Str("eps".into())));
    }

    #[test]
    fn subsystem_is_last_path_segment() {
        assert_eq!(command_with(vec![]).subsystem(), "eps");
        let flat = Command::new(1, "t", "eps", vec![]);
        assert_eq!(flat.subsystem(), "eps");
    }

    #[test]
    fn duplicate_field_last_occurrence_wins() {
        let cmd = command_with(vec![
            ("limit", FieldValue::Int(1)),
            ("limit", FieldValue::Int(9)),
        ]);
        assert_eq!(cmd.field("limit"), Some(&FieldValue::Int(9)));
    }

    #[test]
    fn presence_rejects_missing_empty_and_non_string() {
        let cmd = command_with(vec![
            ("empty", FieldValue::Str(String::new())),
            ("num", FieldValue::Int(3)),
        ]);
        let mut result = CommandResult::new();
        result.validate_presence(&cmd, "missing", "missing is required");
        result.validate_presence(&cmd, "empty", "empty is required");
        result.validate_presence(&cmd, "num", "num is required");
        assert_eq!(
            result.errors,
            vec!["missing is required", "empty is required", "num is required"]
        );
    }

    #[test]
    fn range_is_half_open() {
        let cmd = command_with(vec![("limit", FieldValue::Int(10))]);
        let mut result = CommandResult::new();
        result.validate_range(&cmd, "limit", 0, 10, "Limit must be between 0 and 10");
        assert_eq!(result.errors, vec!["Limit must be between 0 and 10"]);

        let cmd = command_with(vec![("limit", FieldValue::Int(0))]);
        let mut result = CommandResult::new();
        result.validate_range(&cmd, "limit", 0, 10, "Limit must be between 0 and 10");
        assert!(result.valid());
    }

    #[test]
    fn boolean_coerces_integer_toggles() {
        let cmd = command_with(vec![
            ("on", FieldValue::Int(1)),
            ("off", FieldValue::Int(0)),
            ("bad", FieldValue::Int(2)),
        ]);
        let mut result = CommandResult::new();
        assert_eq!(result.validate_boolean(&cmd, "on", "bool required"), Some(true));
        assert_eq!(result.validate_boolean(&cmd, "off", "bool required"), Some(false));
        assert_eq!(result.validate_boolean(&cmd, "bad", "bool required"), None);
        assert_eq!(result.errors, vec!["bool required"]);
    }

    #[test]
    fn sent_result_invariant() {
        let mut result = CommandResult::new();
        result.mark_matched();
        result.payload = "{ ping }".to_string();
        assert!(result.valid());
        result.mark_sent();
        assert!(result.sent && result.errors.is_empty() && !result.payload.is_empty());
    }
}
