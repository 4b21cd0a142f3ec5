use msgbridge_protocol::messages::request::{
    MessageContent, MessagesRequestBody, SystemParam,
};
use sha2::{Digest, Sha256};

/// Pluggable conversation-identity hash. The scheduler uses it to pin a
/// conversation to an account across turns.
pub trait SessionHasher: Send + Sync {
    fn session_hash(&self, api_key_id: &str, body: &MessagesRequestBody) -> String;
}

/// SHA-256 over the api key, the system prompt head, and the first user
/// turn. Stable across turns of the same conversation, cheap to compute.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256SessionHasher;

impl SessionHasher for Sha256SessionHasher {
    fn session_hash(&self, api_key_id: &str, body: &MessagesRequestBody) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key_id.as_bytes());
        hasher.update([0]);

        match &body.system {
            Some(SystemParam::Text(text)) => hasher.update(text.as_bytes()),
            Some(SystemParam::Parts(parts)) => {
                if let Some(part) = parts.first() {
                    hasher.update(part.text.as_bytes());
                }
            }
            None => {}
        }
        hasher.update([0]);

        if let Some(first) = body.messages.first() {
            match &first.content {
                MessageContent::Text(text) => hasher.update(text.as_bytes()),
                MessageContent::Blocks(_) => {
                    if let Ok(encoded) = serde_json::to_vec(&first.content) {
                        hasher.update(&encoded);
                    }
                }
            }
        }

        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}
