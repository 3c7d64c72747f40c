use memo_tensor::{Arena, ArenaRange};

use crate::checkpoint::Config;

/// Scratch buffers reused across every position of one forward pass.
///
/// Sized once from [`Config`] and never reallocated; callers invoke
/// `forward` repeatedly with increasing positions against the same
/// `RunState`. All eight buffers are carved out of one arena rather than
/// allocated independently.
pub struct RunState {
    arena: Arena,
    x: ArenaRange,
    xb: ArenaRange,
    xb2: ArenaRange,
    hb: ArenaRange,
    hb2: ArenaRange,
    q: ArenaRange,
    att: ArenaRange,
    logits: ArenaRange,
}

macro_rules! field_accessors {
    ($get:ident, $get_mut:ident, $field:ident) => {
        pub fn $get(&self) -> &[f32] {
            self.arena
                .slice(self.$field.clone())
                .expect("arena range is internally consistent")
        }

        pub fn $get_mut(&mut self) -> &mut [f32] {
            self.arena
                .slice_mut(self.$field.clone())
                .expect("arena range is internally consistent")
        }
    };
}

impl RunState {
    pub fn new(config: &Config) -> Self {
        let slack = 9 * 2;
        let capacity =
            config.dim * 4 + config.hidden_dim * 2 + config.n_heads * config.seq_len + config.vocab_size + slack;
        let mut arena = Arena::new(capacity);

        let x = arena.push(config.dim);
        let xb = arena.push(config.dim);
        let xb2 = arena.push(config.dim);
        let hb = arena.push(config.hidden_dim);
        let hb2 = arena.push(config.hidden_dim);
        let q = arena.push(config.dim);
        let att = arena.push(config.n_heads * config.seq_len);
        let logits = arena.push(config.vocab_size);

        RunState {
            arena,
            x,
            xb,
            xb2,
            hb,
            hb2,
            q,
            att,
            logits,
        }
    }

    field_accessors!(x, x_mut, x);
    field_accessors!(xb, xb_mut, xb);
    field_accessors!(xb2, xb2_mut, xb2);
    field_accessors!(hb, hb_mut, hb);
    field_accessors!(hb2, hb2_mut, hb2);
    field_accessors!(q, q_mut, q);
    field_accessors!(att, att_mut, att);
    field_accessors!(logits, logits_mut, logits);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            dim: 8,
            hidden_dim: 16,
            n_layers: 2,
            n_heads: 2,
            n_kv_heads: 1,
            vocab_size: 10,
            seq_len: 4,
        }
    }

    #[test]
    fn buffers_sized_from_config() {
        let c = cfg();
        let rs = RunState::new(&c);
        assert_eq!(rs.x().len(), 8);
        assert_eq!(rs.hb().len(), 16);
        assert_eq!(rs.att().len(), 8);
        assert_eq!(rs.logits().len(), 10);
    }

    #[test]
    fn mutations_are_visible_through_immutable_accessor() {
        let c = cfg();
        let mut rs = RunState::new(&c);
        rs.xb_mut().copy_from_slice(&[1.0; 8]);
        assert_eq!(rs.xb(), &[1.0; 8][..]);
    }
}
