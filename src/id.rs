//! ID generation utilities for Runplane
//!
//! Row ids are assigned by the store; these helpers cover the string
//! identifiers that are minted in-process (trace ids and agent ids).

use rand::Rng;
use uuid::Uuid;

/// Generate a fresh trace identifier for a run.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a default agent identifier
///
/// Format: `agent-{8 hex chars}`
/// Example: `agent-1a2b3c4d`
pub fn generate_agent_id() -> String {
    let random: u32 = rand::rng().random();
    format!("agent-{:08x}", random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_is_uuid() {
        let id = generate_trace_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_trace_id_uniqueness() {
        assert_ne!(generate_trace_id(), generate_trace_id());
    }

    #[test]
    fn test_agent_id_format() {
        let id = generate_agent_id();
        assert!(id.starts_with("agent-"));
        let suffix = &id["agent-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
