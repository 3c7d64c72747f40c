use crate::sampler::{Sampler, TokenLogit};

/// Greedy sampler: selects the single token with the highest logit.
///
/// The only selection strategy this crate implements; ties are broken by
/// whichever token sorts first under a stable descending sort (lowest
/// token ID among equal logits).
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() {
            return;
        }

        logits.sort_by(|a, b| {
            b.logit
                .partial_cmp(&a.logit)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.token_id.cmp(&b.token_id))
        });
        logits.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_highest_logit() {
        let mut logits = vec![
            TokenLogit { token_id: 0, logit: 0.1 },
            TokenLogit { token_id: 1, logit: 2.5 },
            TokenLogit { token_id: 2, logit: 1.0 },
        ];
        let s = GreedySampler::new();
        s.apply(&mut logits);
        assert_eq!(logits.len(), 1);
        assert_eq!(logits[0].token_id, 1);
    }

    #[test]
    fn ties_break_by_lowest_token_id() {
        let mut logits = vec![
            TokenLogit { token_id: 5, logit: 1.0 },
            TokenLogit { token_id: 2, logit: 1.0 },
        ];
        let s = GreedySampler::new();
        s.apply(&mut logits);
        assert_eq!(logits[0].token_id, 2);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut logits: Vec<TokenLogit> = Vec::new();
        GreedySampler::new().apply(&mut logits);
        assert!(logits.is_empty());
    }
}
