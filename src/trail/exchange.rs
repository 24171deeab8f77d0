use crate::trail::transcript::{Interaction, InteractionKind};

/// Keep everything from the `last_exchanges`-th-from-last prompt onward.
///
/// A bound of 0, or fewer prompts than the bound, returns the input unchanged.
pub fn filter_last_exchanges(
    interactions: Vec<Interaction>,
    last_exchanges: usize,
) -> Vec<Interaction> {
    if last_exchanges == 0 {
        return interactions;
    }

    let prompt_positions = interactions
        .iter()
        .enumerate()
        .filter(|(_, i)| i.kind == InteractionKind::Prompt)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    if prompt_positions.len() < last_exchanges {
        return interactions;
    }

    let cut = prompt_positions[prompt_positions.len() - last_exchanges];
    let mut interactions = interactions;
    interactions.split_off(cut)
}
