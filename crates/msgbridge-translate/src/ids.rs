use rand::RngCore;

/// Per-request mapping between client-side tool identifiers and upstream
/// `call_*` identifiers. Built while linearizing assistant turns, consulted
/// when user turns reference a prior call and again (reversed) while
/// translating the response. Request-scoped and tiny, so reverse lookup is
/// a linear scan.
#[derive(Debug, Clone, Default)]
pub struct ToolIdMap {
    entries: Vec<(String, String)>,
}

impl ToolIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client_id: impl Into<String>, call_id: impl Into<String>) {
        self.entries.push((client_id.into(), call_id.into()));
    }

    /// Upstream identifier for a client-side tool_use id.
    pub fn call_id_for(&self, client_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(client, _)| client == client_id)
            .map(|(_, call)| call.as_str())
    }

    /// Client-side identifier for an upstream call_id.
    pub fn client_id_for(&self, call_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, call)| call == call_id)
            .map(|(client, _)| client.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `call_` + 24 hex chars; the namespace the upstream expects.
pub fn mint_call_id() -> String {
    format!("call_{}", random_hex::<12>())
}

/// `toolu_` + 24 hex chars; minted when a response references a call the
/// request never mapped.
pub fn mint_tool_use_id() -> String {
    format!("toolu_{}", random_hex::<12>())
}

/// `msg_` + 32 hex chars.
pub fn mint_message_id() -> String {
    format!("msg_{}", random_hex::<16>())
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(N * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
