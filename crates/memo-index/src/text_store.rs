use std::io::{Read, Write};

use crate::error::{IndexError, Result};

/// An append-only list of strings whose row index doubles as its id.
pub struct TextStore {
    lines: Vec<String>,
}

impl TextStore {
    pub fn new() -> Self {
        TextStore { lines: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Appends `text`, returning its row index.
    pub fn add(&mut self, text: &str) -> usize {
        let row = self.lines.len();
        self.lines.push(text.to_string());
        row
    }

    /// Overwrites the text at an existing row.
    pub fn set(&mut self, row: usize, text: &str) -> Result<()> {
        let slot = self.lines.get_mut(row).ok_or(IndexError::UnknownRow(row))?;
        *slot = text.to_string();
        Ok(())
    }

    pub fn get(&self, row: usize) -> Result<&str> {
        self.lines
            .get(row)
            .map(String::as_str)
            .ok_or(IndexError::UnknownRow(row))
    }

    /// Writes `int32 count`, then per row `int32 length` followed by the
    /// row's raw UTF-8 bytes (no terminator).
    pub fn save(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&(self.lines.len() as i32).to_le_bytes())?;
        for line in &self.lines {
            let bytes = line.as_bytes();
            writer.write_all(&(bytes.len() as i32).to_le_bytes())?;
            writer.write_all(bytes)?;
        }
        Ok(())
    }

    pub fn load(reader: &mut impl Read) -> Result<Self> {
        let mut count_buf = [0u8; 4];
        reader.read_exact(&mut count_buf)?;
        let count = i32::from_le_bytes(count_buf) as usize;

        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let len = i32::from_le_bytes(len_buf) as usize;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            let text = String::from_utf8(bytes)
                .map_err(|e| IndexError::Other(format!("invalid utf-8 in text store: {}", e)))?;
            lines.push(text);
        }
        Ok(TextStore { lines })
    }
}

impl Default for TextStore {
    fn default() -> Self {
        Self::new()
    }
}
