//! Whitelist/blacklist filtering over action type strings.

/// Inclusion predicate over action types.
///
/// Patterns match by unanchored substring: the pattern `"POLL"` matches
/// `"POLL_TICK"` and `"STOP_POLLING"`. A record is excluded when it fails
/// the whitelist (if one is configured) or matches the blacklist.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    whitelist: Option<Vec<String>>,
    blacklist: Vec<String>,
}

impl Filter {
    /// Builds a filter from optional whitelist patterns and blacklist
    /// patterns.
    pub fn new(whitelist: Option<Vec<String>>, blacklist: Vec<String>) -> Self {
        Self { whitelist, blacklist }
    }

    /// True when no pattern is configured and everything passes.
    pub fn is_permissive(&self) -> bool {
        self.whitelist.is_none() && self.blacklist.is_empty()
    }

    /// Whether an action of this type may be relayed or displayed.
    pub fn allows(&self, action_type: &str) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.iter().any(|p| action_type.contains(p.as_str())) {
                return false;
            }
        }
        !self.blacklist.iter().any(|p| action_type.contains(p.as_str()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
