use crate::error::Result;
use crate::types::Reading;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Destination for readings the operator decides to keep.
///
/// Persistence (a visit database, an EHR bridge, a file) is up to the
/// embedding application; the engine only hands over the reading.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn save(&self, reading: &Reading) -> Result<()>;
}

/// Keeps saved readings in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<Reading>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<Reading> {
        self.saved.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.lock().is_empty()
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn save(&self, reading: &Reading) -> Result<()> {
        self.saved.lock().push(reading.clone());
        Ok(())
    }
}
