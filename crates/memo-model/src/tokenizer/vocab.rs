use std::io::Read;

use crate::error::{ModelError, Result};

/// Token vocabulary loaded from the tokenizer file format: `int32
/// max_token_length`, then per-token `{f32 score, i32 length, length bytes}`.
pub struct Vocab {
    /// Token byte strings, indexed by token ID. Kept as raw bytes rather
    /// than `String` since individual tokens may be lone bytes outside
    /// valid UTF-8 (e.g. a single byte in the 0x80-0xFF range).
    pub tokens: Vec<Vec<u8>>,
    /// Merge priority scores, indexed by token ID.
    pub scores: Vec<f32>,
    /// Token IDs sorted by their byte string value, for binary-search lookup.
    sorted_ids: Vec<u32>,
    /// Longest token length in bytes.
    pub max_token_length: usize,
}

impl Vocab {
    pub fn load(reader: &mut impl Read) -> Result<Vocab> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let max_token_length = i32::from_le_bytes(len_buf);
        if max_token_length < 0 {
            return Err(ModelError::TokenizerError(
                "negative max_token_length".to_string(),
            ));
        }

        let mut tokens = Vec::new();
        let mut scores = Vec::new();
        let mut index = 0usize;

        loop {
            let mut score_buf = [0u8; 4];
            match reader.read_exact(&mut score_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && index > 0 => break,
                Err(e) => return Err(ModelError::Io(e)),
            }
            let score = f32::from_le_bytes(score_buf);

            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .map_err(|_| ModelError::TruncatedTokenizer { index })?;
            let length = i32::from_le_bytes(len_buf);
            if length < 0 {
                return Err(ModelError::TokenizerError(format!(
                    "negative token length at index {}",
                    index
                )));
            }

            let mut bytes = vec![0u8; length as usize];
            reader
                .read_exact(&mut bytes)
                .map_err(|_| ModelError::TruncatedTokenizer { index })?;

            tokens.push(bytes);
            scores.push(score);
            index += 1;
        }

        let mut sorted_ids: Vec<u32> = (0..tokens.len() as u32).collect();
        sorted_ids.sort_by(|&a, &b| tokens[a as usize].cmp(&tokens[b as usize]));

        tracing::info!(
            target: "memo_model.tokenizer",
            vocab_size = tokens.len(),
            max_token_length,
            "tokenizer vocabulary loaded"
        );

        Ok(Vocab {
            tokens,
            scores,
            sorted_ids,
            max_token_length: max_token_length as usize,
        })
    }

    /// Exact-match lookup via binary search over the sorted token bytes.
    pub fn find(&self, text: &[u8]) -> Option<u32> {
        self.sorted_ids
            .binary_search_by(|&id| self.tokens[id as usize].as_slice().cmp(text))
            .ok()
            .map(|i| self.sorted_ids[i])
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
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

    #[test]
    fn loads_and_finds_tokens() {
        let bytes = write_vocab(&[("a", 0.1), ("b", 0.2), ("ab", 0.9)]);
        let mut cursor = Cursor::new(bytes);
        let vocab = Vocab::load(&mut cursor).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.find(b"ab"), Some(2));
        assert_eq!(vocab.find(b"a"), Some(0));
        assert_eq!(vocab.find(b"zzz"), None);
    }

    #[test]
    fn loads_and_finds_raw_non_utf8_byte_token() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&0.0f32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.push(0xC3); // a lone byte that is not valid UTF-8 on its own
        let mut cursor = Cursor::new(buf);

        let vocab = Vocab::load(&mut cursor).unwrap();
        assert_eq!(vocab.tokens[0], vec![0xC3]);
        assert_eq!(vocab.find(&[0xC3]), Some(0));
    }
}
