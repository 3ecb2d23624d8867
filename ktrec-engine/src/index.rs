//! Bidirectional mapping between raw item identifiers and dense codes.
//!
//! Codes run `1..=N`; code [`PADDING_CODE`] never names a real item. Every
//! construction path sorts the vocabulary byte-wise and removes duplicates,
//! so an index rebuilt from the same item set always assigns the same codes
//! the model was trained with.

use std::collections::HashMap;

use crate::error::{KtError, Result};

/// Reserved code meaning "no interaction".
pub const PADDING_CODE: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIndex {
    item_to_code: HashMap<String, u32>,
    /// `code_to_item[code - 1]` is the raw id for `code`.
    code_to_item: Vec<String>,
}

impl ItemIndex {
    /// Build an index from any collection of raw ids. Duplicates collapse.
    pub fn build<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = vocabulary.into_iter().map(Into::into).collect();
        items.sort_unstable();
        items.dedup();

        let item_to_code = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.clone(), i as u32 + 1))
            .collect();

        Self {
            item_to_code,
            code_to_item: items,
        }
    }

    pub fn encode(&self, item: &str) -> Result<u32> {
        self.item_to_code
            .get(item)
            .copied()
            .ok_or_else(|| KtError::UnknownItem(item.to_string()))
    }

    pub fn decode(&self, code: u32) -> Result<&str> {
        if code == PADDING_CODE {
            return Err(KtError::InvalidCode(code));
        }
        self.code_to_item
            .get(code as usize - 1)
            .map(String::as_str)
            .ok_or(KtError::InvalidCode(code))
    }

    /// Encode a whole history, failing on the first unseen item.
    pub fn encode_all<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<u32>> {
        items.iter().map(|item| self.encode(item.as_ref())).collect()
    }

    /// Number of real items (N).
    pub fn len(&self) -> usize {
        self.code_to_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_item.is_empty()
    }

    /// Size of the code space including the padding slot (N + 1).
    pub fn num_codes(&self) -> usize {
        self.code_to_item.len() + 1
    }

    /// Raw ids in code order (position 0 holds code 1).
    pub fn items(&self) -> &[String] {
        &self.code_to_item
    }
}
