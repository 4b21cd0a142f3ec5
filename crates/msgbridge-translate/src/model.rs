use msgbridge_protocol::responses::request::ReasoningEffort;

/// Split a reasoning-effort suffix off a requested model name.
///
/// `gpt-5.2-codex-xhigh` → `("gpt-5.2-codex", Some(XHigh))`;
/// `codex-mini-latest` → unchanged, no effort.
pub fn parse_model_effort(model: &str) -> (&str, Option<ReasoningEffort>) {
    let Some(dash) = model.rfind('-') else {
        return (model, None);
    };
    if dash == 0 {
        return (model, None);
    }
    let suffix = model[dash + 1..].to_ascii_lowercase();
    match ReasoningEffort::from_suffix(&suffix) {
        Some(effort) => (&model[..dash], Some(effort)),
        None => (model, None),
    }
}
