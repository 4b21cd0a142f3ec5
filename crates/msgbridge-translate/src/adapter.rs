use serde_json::{Map, Value as JsonValue};

/// Fields the upstream rejects or silently misbehaves on when they arrive
/// from non-CLI clients.
pub const DEFAULT_STRIP_FIELDS: &[&str] = &[
    "temperature",
    "top_p",
    "max_output_tokens",
    "user",
    "text_formatting",
    "truncation",
    "text",
    "service_tier",
    "prompt_cache_retention",
    "safety_identifier",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionMode {
    Overwrite,
    Prepend,
    None,
}

impl InstructionMode {
    /// Unknown values collapse to `Overwrite` rather than erroring; the
    /// adapter must keep working under a half-edited config.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("prepend") => Self::Prepend,
            Some("none") => Self::None,
            _ => Self::Overwrite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Prepend => "prepend",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyWhen {
    All,
    NonCli,
}

impl ApplyWhen {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("all") => Self::All,
            _ => Self::NonCli,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub enabled: bool,
    pub mode: InstructionMode,
    pub apply_when: ApplyWhen,
    /// Server-side instruction text; blank falls back to the caller-supplied
    /// default at apply time.
    pub text: Option<String>,
    pub strip_enabled: bool,
    pub strip_fields: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: InstructionMode::Overwrite,
            apply_when: ApplyWhen::NonCli,
            text: None,
            strip_enabled: true,
            strip_fields: DEFAULT_STRIP_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AdapterConfig {
    /// Build from arbitrary JSON. Every field validates independently and
    /// falls back to its default, so a malformed config degrades instead of
    /// failing the request path.
    pub fn from_value(value: &JsonValue) -> Self {
        let defaults = Self::default();
        let Some(map) = value.as_object() else {
            return defaults;
        };

        let instructions = map.get("instructions").and_then(JsonValue::as_object);
        let strip = map.get("stripFields").and_then(JsonValue::as_object);

        Self {
            enabled: map
                .get("enabled")
                .and_then(JsonValue::as_bool)
                .unwrap_or(defaults.enabled),
            mode: InstructionMode::parse(
                instructions
                    .and_then(|m| m.get("mode"))
                    .and_then(JsonValue::as_str),
            ),
            apply_when: ApplyWhen::parse(
                instructions
                    .and_then(|m| m.get("applyWhen"))
                    .and_then(JsonValue::as_str),
            ),
            text: instructions
                .and_then(|m| m.get("text"))
                .and_then(JsonValue::as_str)
                .map(|s| s.to_string()),
            strip_enabled: strip
                .and_then(|m| m.get("enabled"))
                .and_then(JsonValue::as_bool)
                .unwrap_or(defaults.strip_enabled),
            strip_fields: strip
                .and_then(|m| m.get("fields"))
                .and_then(JsonValue::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or(defaults.strip_fields),
        }
    }
}

/// Annotation describing what happened to the `instructions` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionChange {
    pub mode: &'static str,
    pub already_present: bool,
    pub client_missing: bool,
    pub fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterChanges {
    pub stripped_fields: Vec<String>,
    pub instructions: Option<InstructionChange>,
}

#[derive(Debug, Clone)]
pub struct AdaptOutcome {
    pub body: JsonValue,
    pub applied: bool,
    pub changes: AdapterChanges,
}

/// Adapt an outbound request body: strip forbidden fields (non-CLI clients
/// only) and inject server instructions per the configured mode. The input
/// body is never mutated; `body` in the outcome is a shallow copy.
pub fn adapt(
    body: &JsonValue,
    is_cli: bool,
    config: &AdapterConfig,
    default_text: Option<&str>,
) -> AdaptOutcome {
    let Some(object) = body.as_object() else {
        return passthrough(body);
    };
    if !config.enabled {
        return passthrough(body);
    }

    let mut object: Map<String, JsonValue> = object.clone();
    let mut changes = AdapterChanges::default();

    if !is_cli && config.strip_enabled {
        for field in &config.strip_fields {
            if object.remove(field.as_str()).is_some() {
                changes.stripped_fields.push(field.clone());
            }
        }
    }

    let scope_allows = config.apply_when == ApplyWhen::All || !is_cli;
    let server_text = config
        .text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .or_else(|| default_text.filter(|text| !text.trim().is_empty()));

    if scope_allows {
        if let Some(server_text) = server_text {
            changes.instructions =
                apply_instructions(&mut object, config.mode, server_text);
        }
    }

    let applied = !changes.stripped_fields.is_empty() || changes.instructions.is_some();
    AdaptOutcome {
        body: JsonValue::Object(object),
        applied,
        changes,
    }
}

fn apply_instructions(
    object: &mut Map<String, JsonValue>,
    mode: InstructionMode,
    server_text: &str,
) -> Option<InstructionChange> {
    let client_text = object
        .get("instructions")
        .and_then(JsonValue::as_str)
        .unwrap_or("")
        .to_string();
    let client_blank = client_text.trim().is_empty();

    match mode {
        InstructionMode::Overwrite => {
            object.insert(
                "instructions".to_string(),
                JsonValue::String(server_text.to_string()),
            );
            Some(InstructionChange {
                mode: mode.as_str(),
                ..Default::default()
            })
        }
        InstructionMode::Prepend => {
            if !client_blank
                && (client_text.starts_with(server_text)
                    || client_text.trim_start().starts_with(server_text))
            {
                return Some(InstructionChange {
                    mode: mode.as_str(),
                    already_present: true,
                    ..Default::default()
                });
            }
            if !client_blank {
                object.insert(
                    "instructions".to_string(),
                    JsonValue::String(format!("{server_text}\n\n{client_text}")),
                );
                Some(InstructionChange {
                    mode: mode.as_str(),
                    ..Default::default()
                })
            } else {
                object.insert(
                    "instructions".to_string(),
                    JsonValue::String(server_text.to_string()),
                );
                Some(InstructionChange {
                    mode: mode.as_str(),
                    client_missing: true,
                    ..Default::default()
                })
            }
        }
        InstructionMode::None => {
            // Backfill only: a blank client value would be rejected upstream.
            if client_blank {
                object.insert(
                    "instructions".to_string(),
                    JsonValue::String(server_text.to_string()),
                );
                Some(InstructionChange {
                    mode: mode.as_str(),
                    fallback: true,
                    ..Default::default()
                })
            } else {
                None
            }
        }
    }
}

fn passthrough(body: &JsonValue) -> AdaptOutcome {
    AdaptOutcome {
        body: body.clone(),
        applied: false,
        changes: AdapterChanges::default(),
    }
}
