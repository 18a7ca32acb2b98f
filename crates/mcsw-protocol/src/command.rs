//! Statically declared table of remote operations.
//!
//! Each entry names an operation of the media control server and its
//! positional arguments, in the order the server expects them. The table
//! drives the `call` command line surface and the parameter objects
//! attached to normalized errors.

use serde_json::{Map, Value};

use crate::event::ProtocolError;

/// How a textual argument is turned into a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Passed through as a JSON string.
    Text,
    /// Parsed as JSON; falls back to a JSON string if it does not parse.
    Json,
}

/// One positional argument of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    /// JSON text used when the argument is omitted. `None` means required.
    pub default: Option<&'static str>,
}

/// A remote operation and its argument schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub summary: &'static str,
}

const fn text(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind: ArgKind::Text,
        default: None,
    }
}

const fn json(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind: ArgKind::Json,
        default: None,
    }
}

const fn optional(arg: ArgSpec, default: &'static str) -> ArgSpec {
    ArgSpec {
        name: arg.name,
        kind: arg.kind,
        default: Some(default),
    }
}

/// Every remote operation the sidecar knows about.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "getRooms",
        args: &[],
        summary: "List the rooms known to the server",
    },
    CommandSpec {
        name: "getUsers",
        args: &[text("roomId")],
        summary: "List the users of a room",
    },
    CommandSpec {
        name: "getUserMedias",
        args: &[text("userId")],
        summary: "List the medias of a user",
    },
    CommandSpec {
        name: "join",
        args: &[text("room"), text("type"), optional(json("params"), "{}")],
        summary: "Join a room, returning the new user id",
    },
    CommandSpec {
        name: "leave",
        args: &[text("room"), text("user")],
        summary: "Remove a user from a room",
    },
    CommandSpec {
        name: "publishAndSubscribe",
        args: &[
            text("room"),
            text("user"),
            text("sourceId"),
            text("type"),
            optional(json("params"), "{}"),
        ],
        summary: "Publish a media and subscribe it to a source",
    },
    CommandSpec {
        name: "publish",
        args: &[text("user"), text("room"), text("type"), optional(json("params"), "{}")],
        summary: "Publish a media for a user",
    },
    CommandSpec {
        name: "unpublish",
        args: &[text("mediaId")],
        summary: "Stop a published media",
    },
    CommandSpec {
        name: "subscribe",
        args: &[text("user"), text("sourceId"), text("type"), optional(json("params"), "{}")],
        summary: "Subscribe a user to a source media",
    },
    CommandSpec {
        name: "unsubscribe",
        args: &[text("user"), text("mediaId")],
        summary: "Stop a subscribed media",
    },
    CommandSpec {
        name: "connect",
        args: &[text("source"), json("sinks"), optional(text("type"), "\"ALL\"")],
        summary: "Connect a source media to sinks",
    },
    CommandSpec {
        name: "disconnect",
        args: &[text("source"), json("sinks"), optional(text("type"), "\"ALL\"")],
        summary: "Disconnect a source media from sinks",
    },
    CommandSpec {
        name: "addIceCandidate",
        args: &[text("mediaId"), json("candidate")],
        summary: "Forward an ICE candidate to a media",
    },
    CommandSpec {
        name: "startRecording",
        args: &[text("userId"), text("mediaId"), text("path")],
        summary: "Record a media to a path on the server",
    },
    CommandSpec {
        name: "stopRecording",
        args: &[text("userId"), text("recordingId")],
        summary: "Stop a recording",
    },
];

/// Looks up an operation by its remote name.
pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

impl CommandSpec {
    /// Number of arguments without a default.
    #[must_use]
    pub fn required_args(&self) -> usize {
        self.args.iter().filter(|a| a.default.is_none()).count()
    }

    /// Converts textual arguments into positional JSON params, filling
    /// omitted trailing arguments from their defaults.
    pub fn build_params(&self, raw: &[String]) -> Result<Vec<Value>, ProtocolError> {
        let required = self.required_args();
        if raw.len() < required || raw.len() > self.args.len() {
            let expected = if required == self.args.len() {
                required.to_string()
            } else {
                format!("{required}..={}", self.args.len())
            };
            return Err(ProtocolError::Arity {
                command: self.name.to_string(),
                expected,
                got: raw.len(),
            });
        }

        let mut params = Vec::with_capacity(self.args.len());
        for (idx, spec) in self.args.iter().enumerate() {
            let value = match (raw.get(idx), spec.default) {
                (Some(text), _) => convert(spec.kind, text),
                (None, Some(default)) => {
                    serde_json::from_str(default).unwrap_or(Value::String(default.to_string()))
                }
                (None, None) => break,
            };
            params.push(value);
        }
        Ok(params)
    }

    /// Pairs positional params with argument names, for error reporting.
    #[must_use]
    pub fn named_params(&self, params: &[Value]) -> Value {
        let map: Map<String, Value> = self
            .args
            .iter()
            .zip(params.iter())
            .map(|(spec, value)| (spec.name.to_string(), value.clone()))
            .collect();
        Value::Object(map)
    }

    /// One-line usage string, e.g. `join <room> <type> [params]`.
    #[must_use]
    pub fn usage(&self) -> String {
        let mut usage = self.name.to_string();
        for arg in self.args {
            if arg.default.is_some() {
                usage.push_str(&format!(" [{}]", arg.name));
            } else {
                usage.push_str(&format!(" <{}>", arg.name));
            }
        }
        usage
    }
}

fn convert(kind: ArgKind, text: &str) -> Value {
    match kind {
        ArgKind::Text => Value::String(text.to_string()),
        ArgKind::Json => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_has_every_operation_once() {
        let mut names: Vec<_> = COMMANDS.iter().map(|c| c.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 15);
    }

    #[test]
    fn test_find_command() {
        assert_eq!(find_command("getRooms").map(|c| c.args.len()), Some(0));
        assert!(find_command("getroom").is_none());
    }

    #[test]
    fn test_build_params_fills_defaults() {
        let connect = find_command("connect").unwrap();
        let params = connect.build_params(&args(&["m1", "[\"m2\",\"m3\"]"])).unwrap();
        assert_eq!(params, vec![json!("m1"), json!(["m2", "m3"]), json!("ALL")]);
    }

    #[test]
    fn test_build_params_json_fallback_to_string() {
        let ice = find_command("addIceCandidate").unwrap();
        let params = ice.build_params(&args(&["m1", "candidate:1 1 udp"])).unwrap();
        assert_eq!(params, vec![json!("m1"), json!("candidate:1 1 udp")]);
    }

    #[test]
    fn test_text_args_stay_strings() {
        let users = find_command("getUsers").unwrap();
        let params = users.build_params(&args(&["123"])).unwrap();
        assert_eq!(params, vec![json!("123")]);
    }

    #[test]
    fn test_arity_errors() {
        let join = find_command("join").unwrap();
        let err = join.build_params(&args(&["r1"])).unwrap_err();
        assert_eq!(err.to_string(), "join expects 2..=3 argument(s), got 1");

        let rooms = find_command("getRooms").unwrap();
        let err = rooms.build_params(&args(&["extra"])).unwrap_err();
        assert_eq!(err.to_string(), "getRooms expects 0 argument(s), got 1");
    }

    #[test]
    fn test_named_params() {
        let leave = find_command("leave").unwrap();
        let named = leave.named_params(&[json!("r1"), json!("u1")]);
        assert_eq!(named, json!({"room": "r1", "user": "u1"}));
    }

    #[test]
    fn test_usage() {
        let join = find_command("join").unwrap();
        assert_eq!(join.usage(), "join <room> <type> [params]");
    }
}
