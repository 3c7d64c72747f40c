use std::io::Read;

use crate::error::Result;
use super::vocab::Vocab;

/// Greedy byte-pair-encoding tokenizer.
///
/// Encoding proceeds in two passes: each input byte is looked up as a
/// single-byte token (bytes with no matching vocabulary entry are dropped),
/// then adjacent token pairs are repeatedly merged, picking the pair whose
/// concatenation is a vocabulary entry with the highest merge score
/// (ties broken by the leftmost pair) until no further merge is found.
pub struct Tokenizer {
    vocab: Vocab,
}

impl Tokenizer {
    pub fn load(reader: &mut impl Read) -> Result<Tokenizer> {
        let vocab = Vocab::load(reader)?;
        Ok(Tokenizer { vocab })
    }

    /// Encodes `text` into a sequence of token IDs. Bytes with no matching
    /// single-byte vocabulary entry are silently dropped.
    ///
    /// Operates on raw bytes throughout, matching byte-level vocabulary
    /// entries that are not themselves valid UTF-8 (e.g. a lone byte in the
    /// 0x80-0xFF range).
    pub fn encode(&self, text: &str) -> Vec<u32> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut tokens: Vec<u32> = Vec::with_capacity(text.len());
        for byte in text.bytes() {
            if let Some(id) = self.vocab.find(&[byte]) {
                tokens.push(id);
            }
        }

        loop {
            if tokens.len() < 2 {
                break;
            }

            let mut best_score = f32::NEG_INFINITY;
            let mut best_idx = None;
            let mut best_id = 0u32;

            for i in 0..tokens.len() - 1 {
                let mut merged = self.vocab.tokens[tokens[i] as usize].clone();
                merged.extend_from_slice(&self.vocab.tokens[tokens[i + 1] as usize]);
                if let Some(id) = self.vocab.find(&merged) {
                    let score = self.vocab.scores[id as usize];
                    if score > best_score {
                        best_score = score;
                        best_idx = Some(i);
                        best_id = id;
                    }
                }
            }

            match best_idx {
                Some(i) => {
                    tokens[i] = best_id;
                    tokens.remove(i + 1);
                }
                None => break,
            }
        }

        tokens
    }

    /// Decodes a single token ID back to its literal vocabulary bytes.
    pub fn decode(&self, token: u32) -> &[u8] {
        &self.vocab.tokens[token as usize]
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_vocab(entries: &[(&str, f32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        let max_len = entries.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
        buf.extend_from_slice(&(max_len as i32).to_le_bytes());
        for (s, score) in entries {
            buf.extend_from_slice(&score.to_le_bytes());
            buf.extend_from_slice(&(s.len() as i32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    fn tokenizer_with(entries: &[(&str, f32)]) -> Tokenizer {
        let bytes = write_vocab(entries);
        let mut cursor = Cursor::new(bytes);
        Tokenizer::load(&mut cursor).unwrap()
    }

    #[test]
    fn encode_drops_unmapped_bytes() {
        let tok = tokenizer_with(&[("a", 0.0), ("b", 0.0)]);
        // 'c' has no vocabulary entry and is dropped.
        let ids = tok.encode("acb");
        let decoded: Vec<u8> = ids.iter().flat_map(|&id| tok.decode(id).to_vec()).collect();
        assert_eq!(decoded, b"ab");
    }

    #[test]
    fn encode_merges_highest_score_pair_first() {
        // "a"+"b" merges to "ab" before "b"+"c" merges to "bc", because "ab"
        // has the higher score.
        let tok = tokenizer_with(&[
            ("a", 0.0),
            ("b", 0.0),
            ("c", 0.0),
            ("bc", 0.5),
            ("ab", 1.0),
        ]);
        let ids = tok.encode("abc");
        assert_eq!(ids.len(), 2);
        assert_eq!(tok.decode(ids[0]), b"ab");
        assert_eq!(tok.decode(ids[1]), b"c");
    }

    #[test]
    fn encode_matches_raw_non_utf8_byte_token() {
        // A vocabulary entry that is a lone high byte, as produced by a
        // byte-level tokenizer's fallback alphabet. `text.bytes()` still
        // yields the same raw byte regardless of UTF-8 validity at the
        // `&str` level, since callers pass already-decoded text; this test
        // instead drives `Vocab::find` directly with the same raw byte path
        // `encode` uses, confirming no lossy round trip occurs.
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&0.0f32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.push(0xC3);
        let mut cursor = Cursor::new(buf);
        let tok = Tokenizer::load(&mut cursor).unwrap();
        assert_eq!(tok.vocab.find(&[0xC3]), Some(0));
        assert_eq!(tok.decode(0), &[0xC3]);
    }

    #[test]
    fn encode_stops_when_no_merge_found() {
        let tok = tokenizer_with(&[("a", 0.0), ("b", 0.0)]);
        let ids = tok.encode("ab");
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn encode_is_deterministic() {
        let tok = tokenizer_with(&[("a", 0.0), ("b", 0.0), ("ab", 1.0)]);
        assert_eq!(tok.encode("ab"), tok.encode("ab"));
    }

    #[test]
    fn encode_empty_string() {
        let tok = tokenizer_with(&[("a", 0.0)]);
        assert!(tok.encode("").is_empty());
    }
}
