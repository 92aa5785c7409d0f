use uuid::Uuid;

/// Source of transaction identifiers.
///
/// Identifiers are opaque and never derived from content, so two identical
/// transactions still get different ids.
pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// `ledger-1`, `ledger-2`, ...
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    counter: u64,
}

impl SequentialIds {
    pub fn with_prefix(prefix: &str) -> Self {
        SequentialIds {
            prefix: prefix.to_string(),
            counter: 0,
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::with_prefix("ledger")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{}", self.prefix, self.counter)
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}
