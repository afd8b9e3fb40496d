//! Host event scripts: one s-expression plist per line.
//!
//! ```text
//! ; comment
//! (:event :activate :file-name "sample.jpg")
//! (:event :focus :has-focus t)
//! (:event :foreground)
//! (:event :permission-result :granted t :can-ask-again t)
//! (:event :permission-result :granted t :host-granted nil)
//! (:event :chrome-reveal)
//! (:event :system-ui-visibility :flags 0)
//! (:event :switch-viewer)
//! (:event :background)
//! (:event :deactivate)
//! ```

use lexpr::Value;
use thiserror::Error;
use tracing::debug;

use crate::activity::{ActivationIntent, HostEvent};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: malformed s-expression: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: lexpr::parse::Error,
    },
    #[error("line {line}: missing :event field")]
    MissingEvent { line: usize },
    #[error("line {line}: unknown event :{event}")]
    UnknownEvent { line: usize, event: String },
    #[error("line {line}: event :{event} requires :{field}")]
    MissingField {
        line: usize,
        event: String,
        field: &'static str,
    },
    #[error("line {line}: :{field} value {value} is out of range")]
    OutOfRange {
        line: usize,
        field: &'static str,
        value: i64,
    },
}

/// One scripted host event.
///
/// `host_granted` sets the simulated host's authorization state before the
/// event is dispatched. When absent, a permission result sets it from its
/// own `granted` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedEvent {
    pub event: HostEvent,
    pub host_granted: Option<bool>,
}

impl From<HostEvent> for ScriptedEvent {
    fn from(event: HostEvent) -> Self {
        Self {
            event,
            host_granted: None,
        }
    }
}

/// Parse one script line. Blank lines and `;` comments yield None.
pub fn parse_line(line_no: usize, raw: &str) -> Result<Option<ScriptedEvent>, ScriptError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(';') {
        return Ok(None);
    }

    let value = lexpr::from_str(trimmed).map_err(|source| ScriptError::Malformed {
        line: line_no,
        source,
    })?;
    let event = get_keyword(&value, "event").ok_or(ScriptError::MissingEvent { line: line_no })?;
    let missing = |field: &'static str| ScriptError::MissingField {
        line: line_no,
        event: event.clone(),
        field,
    };

    let parsed = match event.as_str() {
        "activate" => {
            let mut intent = ActivationIntent::new();
            if let Some(name) = get_string(&value, "file-name") {
                intent.put_extra(crate::activity::FILE_NAME_EXTRA, name);
            }
            HostEvent::Activate(intent)
        }
        "foreground" => HostEvent::Foreground,
        "background" => HostEvent::Background,
        "deactivate" => HostEvent::Deactivate,
        "focus" => HostEvent::FocusChanged {
            has_focus: get_bool(&value, "has-focus").unwrap_or(true),
        },
        "chrome-reveal" => HostEvent::SystemUiVisibility { visibility: 0 },
        "system-ui-visibility" => {
            let flags = get_int(&value, "flags").ok_or_else(|| missing("flags"))?;
            let visibility = u32::try_from(flags).map_err(|_| ScriptError::OutOfRange {
                line: line_no,
                field: "flags",
                value: flags,
            })?;
            HostEvent::SystemUiVisibility { visibility }
        }
        "permission-result" => HostEvent::PermissionResult {
            granted: get_bool(&value, "granted").ok_or_else(|| missing("granted"))?,
            can_ask_again: get_bool(&value, "can-ask-again").unwrap_or(true),
        },
        "switch-viewer" => HostEvent::SwitchViewer,
        "close" => HostEvent::Close,
        other => {
            return Err(ScriptError::UnknownEvent {
                line: line_no,
                event: other.to_string(),
            })
        }
    };
    let host_granted = match parsed {
        HostEvent::PermissionResult { .. } => get_bool(&value, "host-granted"),
        _ => None,
    };
    debug!(line = line_no, event = parsed.as_str(), ?host_granted, "parsed script event");
    Ok(Some(ScriptedEvent {
        event: parsed,
        host_granted,
    }))
}

/// Parse a whole script.
pub fn parse_script(text: &str) -> Result<Vec<ScriptedEvent>, ScriptError> {
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(event) = parse_line(idx + 1, line)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// The script run when none is supplied: a complete foreground session.
pub fn default_script(file_name: &str) -> Vec<HostEvent> {
    vec![
        HostEvent::Activate(ActivationIntent::with_file_name(file_name)),
        HostEvent::FocusChanged { has_focus: true },
        HostEvent::Foreground,
        HostEvent::Background,
        HostEvent::Deactivate,
    ]
}

// ── Plist helpers ────────────────────────────────────────────

/// Extract a keyword value from an s-expression plist.
/// Handles both `Value::Keyword("key")` and `Value::Symbol(":key")` forms.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return Some(match val {
                Value::Keyword(v) => v.to_string(),
                Value::Symbol(v) => {
                    let s = v.to_string();
                    s.strip_prefix(':').unwrap_or(&s).to_string()
                }
                Value::String(v) => v.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => (if *b { "t" } else { "nil" }).to_string(),
                Value::Null | Value::Nil => "nil".to_string(),
                _ => val.to_string(),
            });
        }
        current = pair.cdr();
    }
    None
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Treats "nil" as false, anything else as true.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}
