/// Product prefixes whose user agents mark a CLI client. CLI clients keep
/// their request bodies intact: no field stripping and, under the default
/// scope, no instruction injection.
const CLI_PRODUCTS: &[&str] = &["codex_vscode", "codex_cli_rs", "codex_exec"];

/// Matches `<product>/<version>` where version is dotted digits, e.g.
/// `codex_cli_rs/0.48.0 (Mac OS ...)`. Case-insensitive on the product.
pub fn is_cli_user_agent(user_agent: Option<&str>) -> bool {
    let Some(user_agent) = user_agent else {
        return false;
    };
    let lower = user_agent.to_ascii_lowercase();
    CLI_PRODUCTS.iter().any(|product| {
        lower
            .strip_prefix(product)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(version_leads)
            .unwrap_or(false)
    })
}

/// True when `rest` starts with `\d+(\.\d+)*`; anything after the version
/// (platform suffixes and the like) is irrelevant.
fn version_leads(rest: &str) -> bool {
    let mut rest = match consume_digits(rest) {
        Some(rest) => rest,
        None => return false,
    };
    while let Some(tail) = rest
        .strip_prefix('.')
        .and_then(consume_digits)
    {
        rest = tail;
    }
    true
}

fn consume_digits(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        None
    } else {
        Some(&text[end..])
    }
}

/// Split a vendor-prefixed model of the form `<vendor>,<base-model>`.
pub fn split_vendor_model(model: &str) -> Option<(&str, &str)> {
    let (vendor, base) = model.split_once(',')?;
    if vendor.is_empty() || base.is_empty() {
        return None;
    }
    Some((vendor, base))
}
