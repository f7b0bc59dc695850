//! Frame shapes for the Roomcast wire protocol.
//!
//! Every socket message carries one frame: a value sequence whose first
//! element is an integer discriminant. Outbound request frames are
//! `[callId, kind, ...args]`. Inbound frames come in two families:
//!
//! - event frames `[2, eventName?, ...eventArgs]`
//! - response frames `[status, callId, result]`, status `0` on success
//!
//! [`classify`] sorts decoded inbound frames into those families and
//! discards anything that fits neither, so protocol extensions and noise
//! never become errors.

use std::collections::BTreeMap;

use crate::value::Value;

/// Discriminant marking an inbound event frame.
pub const EVENT_FRAME_MARKER: i64 = 2;

/// Response status indicating success.
pub const STATUS_OK: i64 = 0;

/// Application-level close code sent when the client closes the socket.
pub const APP_CLOSE_CODE: u16 = 4000;

/// Correlated-call identifier, assigned from a per-connection counter.
pub type CallId = u64;

/// The request kinds a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Create a room from a descriptor.
    Room,
    /// Join an existing room.
    Join,
    /// Invoke a method inside the joined room.
    Call,
}

impl CallKind {
    /// The wire name of this request kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Join => "join",
            Self::Call => "call",
        }
    }
}

/// Build the outbound frame for one correlated request.
pub fn request_frame(call_id: CallId, kind: CallKind, args: Vec<Value>) -> Vec<Value> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.push(Value::Int(call_id as i64));
    frame.push(Value::Str(kind.as_str().to_string()));
    frame.extend(args);
    frame
}

/// A recognized inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Broadcast/event frame; `payload` is everything after the marker.
    Event {
        /// Event name (if textual) followed by event arguments.
        payload: Vec<Value>,
    },
    /// Response to a previously sent correlated call.
    Response {
        /// Identifier the request was sent with.
        call_id: CallId,
        /// `0` on success; anything else is a rejection.
        status: i64,
        /// Result on success, error value on rejection.
        result: Value,
    },
}

/// Classify one decoded inbound frame.
///
/// Returns `None` for frames that match neither family: empty frames,
/// non-integer discriminants, and responses whose call id is missing or
/// not a non-negative integer. String call ids are legal on the wire but
/// this client never issues them, so they can never match a pending call
/// and are dropped here.
pub fn classify(frame: Vec<Value>) -> Option<InboundFrame> {
    let mut values = frame.into_iter();
    let Value::Int(discriminant) = values.next()? else {
        return None;
    };
    if discriminant == EVENT_FRAME_MARKER {
        return Some(InboundFrame::Event {
            payload: values.collect(),
        });
    }
    let call_id = match values.next()? {
        Value::Int(id) if id >= 0 => id as CallId,
        _ => return None,
    };
    let result = values.next().unwrap_or(Value::Null);
    Some(InboundFrame::Response {
        call_id,
        status: discriminant,
        result,
    })
}

// ── Room descriptors ────────────────────────────────────────────────

/// Description of the modules a new room should be created with.
///
/// Converts into the [`Value`] map expected by the create-room request:
/// `{ "modules": { name: { "type": "js", ... } } }`.
///
/// # Example
///
/// ```
/// use roomcast_client::protocol::{ModuleDescriptor, RoomDescriptor};
///
/// let descriptor = RoomDescriptor::new().with_module(
///     "index",
///     ModuleDescriptor::new()
///         .with_source("export function ping() { return \"pong\"; }")
///         .with_evaluate(true),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoomDescriptor {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl RoomDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named module.
    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>, module: ModuleDescriptor) -> Self {
        self.modules.insert(name.into(), module);
        self
    }
}

/// One module inside a [`RoomDescriptor`].
///
/// Hooks take either wire form: a plain list of exported function names
/// ([`with_hook`](Self::with_hook)), or a map from hook name to its
/// target ([`with_hook_alias`](Self::with_hook_alias)). Using any alias
/// switches the whole module to the map form; plain hooks fold in as
/// `name: true`.
#[derive(Debug, Clone, Default)]
pub struct ModuleDescriptor {
    source: Option<String>,
    evaluate: Option<bool>,
    hooks: Vec<String>,
    hook_aliases: BTreeMap<String, Value>,
}

impl ModuleDescriptor {
    /// Create an empty module description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the module source text.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set whether the module is evaluated eagerly at room creation.
    #[must_use]
    pub fn with_evaluate(mut self, evaluate: bool) -> Self {
        self.evaluate = Some(evaluate);
        self
    }

    /// Expose an exported function as a room hook.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.hooks.push(hook.into());
        self
    }

    /// Expose a hook under `name`, mapped to `target`: the name of the
    /// exported function to bind, or a boolean toggling the export of
    /// the same name.
    #[must_use]
    pub fn with_hook_alias(mut self, name: impl Into<String>, target: impl Into<Value>) -> Self {
        self.hook_aliases.insert(name.into(), target.into());
        self
    }
}

impl From<ModuleDescriptor> for Value {
    fn from(module: ModuleDescriptor) -> Self {
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), Value::from("js"));
        if let Some(source) = module.source {
            map.insert("source".to_string(), Value::from(source));
        }
        if let Some(evaluate) = module.evaluate {
            map.insert("evaluate".to_string(), Value::from(evaluate));
        }
        if !module.hook_aliases.is_empty() {
            let mut hooks = module.hook_aliases;
            for name in module.hooks {
                hooks.entry(name).or_insert(Value::Bool(true));
            }
            map.insert("hooks".to_string(), Value::Map(hooks));
        } else if !module.hooks.is_empty() {
            let hooks = module.hooks.into_iter().map(Value::from).collect();
            map.insert("hooks".to_string(), Value::List(hooks));
        }
        Value::Map(map)
    }
}

impl From<RoomDescriptor> for Value {
    fn from(descriptor: RoomDescriptor) -> Self {
        let modules = descriptor
            .modules
            .into_iter()
            .map(|(name, module)| (name, Value::from(module)))
            .collect();
        let mut map = BTreeMap::new();
        map.insert("modules".to_string(), Value::Map(modules));
        Value::Map(map)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_layout() {
        let frame = request_frame(3, CallKind::Join, vec![Value::from("r1"), Value::from("s")]);
        assert_eq!(
            frame,
            vec![
                Value::Int(3),
                Value::from("join"),
                Value::from("r1"),
                Value::from("s"),
            ]
        );
    }

    #[test]
    fn classifies_event_frames() {
        let frame = vec![
            Value::Int(EVENT_FRAME_MARKER),
            Value::from("chat"),
            Value::from("alice"),
        ];
        let classified = classify(frame).unwrap();
        assert_eq!(
            classified,
            InboundFrame::Event {
                payload: vec![Value::from("chat"), Value::from("alice")],
            }
        );
    }

    #[test]
    fn classifies_empty_event_payload() {
        let classified = classify(vec![Value::Int(EVENT_FRAME_MARKER)]).unwrap();
        assert_eq!(classified, InboundFrame::Event { payload: vec![] });
    }

    #[test]
    fn classifies_success_response() {
        let frame = vec![Value::Int(STATUS_OK), Value::Int(7), Value::Bool(true)];
        assert_eq!(
            classify(frame).unwrap(),
            InboundFrame::Response {
                call_id: 7,
                status: 0,
                result: Value::Bool(true),
            }
        );
    }

    #[test]
    fn classifies_failure_response_with_any_nonzero_status() {
        let frame = vec![Value::Int(5), Value::Int(1), Value::from("nope")];
        assert_eq!(
            classify(frame).unwrap(),
            InboundFrame::Response {
                call_id: 1,
                status: 5,
                result: Value::from("nope"),
            }
        );
    }

    #[test]
    fn response_without_result_defaults_to_null() {
        let frame = vec![Value::Int(STATUS_OK), Value::Int(2)];
        assert_eq!(
            classify(frame).unwrap(),
            InboundFrame::Response {
                call_id: 2,
                status: 0,
                result: Value::Null,
            }
        );
    }

    #[test]
    fn discards_malformed_frames() {
        assert_eq!(classify(vec![]), None);
        assert_eq!(classify(vec![Value::from("what")]), None);
        assert_eq!(classify(vec![Value::Int(0)]), None);
        assert_eq!(classify(vec![Value::Int(0), Value::Int(-1)]), None);
        assert_eq!(classify(vec![Value::Int(0), Value::Bool(true)]), None);
        // String call ids never match a pending call; dropped outright.
        assert_eq!(classify(vec![Value::Int(0), Value::from("id-9")]), None);
    }

    #[test]
    fn room_descriptor_builds_expected_value() {
        let descriptor = RoomDescriptor::new().with_module(
            "index",
            ModuleDescriptor::new()
                .with_source("export const x = 1;")
                .with_evaluate(true)
                .with_hook("onJoin"),
        );
        let value = Value::from(descriptor);

        let Value::Map(root) = value else {
            panic!("expected map");
        };
        let Some(Value::Map(modules)) = root.get("modules") else {
            panic!("expected modules map");
        };
        let Some(Value::Map(index)) = modules.get("index") else {
            panic!("expected index module");
        };
        assert_eq!(index.get("type"), Some(&Value::from("js")));
        assert_eq!(index.get("source"), Some(&Value::from("export const x = 1;")));
        assert_eq!(index.get("evaluate"), Some(&Value::Bool(true)));
        assert_eq!(
            index.get("hooks"),
            Some(&Value::List(vec![Value::from("onJoin")]))
        );
    }

    #[test]
    fn hook_aliases_build_map_form() {
        let module = ModuleDescriptor::new()
            .with_hook_alias("onJoin", Value::from("handleJoin"))
            .with_hook_alias("onLeave", Value::Bool(false));
        let Value::Map(map) = Value::from(module) else {
            panic!("expected map");
        };
        let Some(Value::Map(hooks)) = map.get("hooks") else {
            panic!("expected hooks map");
        };
        assert_eq!(hooks.get("onJoin"), Some(&Value::from("handleJoin")));
        assert_eq!(hooks.get("onLeave"), Some(&Value::Bool(false)));
    }

    #[test]
    fn plain_hooks_fold_into_map_form_when_aliases_present() {
        let module = ModuleDescriptor::new()
            .with_hook("ping")
            .with_hook_alias("onJoin", Value::from("handleJoin"));
        let Value::Map(map) = Value::from(module) else {
            panic!("expected map");
        };
        let Some(Value::Map(hooks)) = map.get("hooks") else {
            panic!("expected hooks map");
        };
        assert_eq!(hooks.get("ping"), Some(&Value::Bool(true)));
        assert_eq!(hooks.get("onJoin"), Some(&Value::from("handleJoin")));
    }

    #[test]
    fn empty_module_omits_optional_fields() {
        let Value::Map(map) = Value::from(ModuleDescriptor::new()) else {
            panic!("expected map");
        };
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("type"), Some(&Value::from("js")));
    }
}
