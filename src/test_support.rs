// In-memory word store for handler and router tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::db::{random_offset, WordStore};
use crate::error::{ApiError, ApiResult};

pub struct MemoryStore {
    words: Vec<(String, bool)>,
    lookups: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(words: &[(&str, bool)]) -> Self {
        let mut words: Vec<(String, bool)> = words
            .iter()
            .map(|(word, winning)| (word.to_string(), *winning))
            .collect();
        words.sort();

        Self {
            words,
            lookups: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl WordStore for MemoryStore {
    async fn random_word(&self) -> ApiResult<String> {
        let winning: Vec<&String> = self
            .words
            .iter()
            .filter(|(_, winning)| *winning)
            .map(|(word, _)| word)
            .collect();

        let offset = random_offset(winning.len() as i64, &mut rand::thread_rng())
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("No winning words available")))?;

        Ok(winning[offset as usize].clone())
    }

    async fn word_exists(&self, word: &str) -> ApiResult<bool> {
        self.lookups.lock().unwrap().push(word.to_string());
        Ok(self.words.iter().any(|(candidate, _)| candidate == word))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
