use crate::trail::transcript::Interaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounters {
    pub input: u64,
    pub output: u64,
    pub cache_create: u64,
    pub cache_read: u64,
}

impl TokenCounters {
    pub fn add(&mut self, other: &TokenCounters) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_create = self.cache_create.saturating_add(other.cache_create);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
    }
}

/// Recompute input/output from the interactions that survived filtering.
///
/// When the surviving interactions carry no tokens at all, the pre-filter
/// totals are reported instead. Cache counters are session-wide either way.
pub fn reconcile_totals(interactions: &[Interaction], pre_filter: TokenCounters) -> TokenCounters {
    let input = interactions
        .iter()
        .filter_map(|i| i.input_tokens)
        .fold(0u64, u64::saturating_add);
    let output = interactions
        .iter()
        .filter_map(|i| i.output_tokens)
        .fold(0u64, u64::saturating_add);

    if input == 0 && output == 0 {
        return pre_filter;
    }

    TokenCounters {
        input,
        output,
        ..pre_filter
    }
}
