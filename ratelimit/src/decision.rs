#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        remaining: u32,
        reset_at_ms: u64,
    },
    Denied {
        retry_after_seconds: u64,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Decision::Denied {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            Decision::Allowed { .. } => None,
        }
    }
}
