//! Shared OCR engine with lazy initialization and a result cache.

use locus_common::{FindTextOptions, OcrEngine, OcrError, TextSearchResult};
use std::collections::HashMap;
use tokio::sync::Mutex;

const CACHE_CAPACITY: usize = 64;

type CacheKey = (blake3::Hash, String, FindTextOptions);

struct EngineSlot {
    engine: Box<dyn OcrEngine>,
    initialized: bool,
}

/// One OCR engine shared by the visual-text evaluator and the conditional
/// poll. Calls queue on the engine lock, so inference never runs concurrently.
pub struct OcrService {
    slot: Mutex<EngineSlot>,
    cache: Mutex<HashMap<CacheKey, TextSearchResult>>,
}

impl OcrService {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            slot: Mutex::new(EngineSlot {
                engine,
                initialized: false,
            }),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.lock().await.initialized
    }

    pub async fn ensure_initialized(&self) -> Result<(), OcrError> {
        let mut slot = self.slot.lock().await;
        if !slot.initialized {
            tracing::debug!("Initializing OCR engine");
            slot.engine.initialize().await?;
            slot.initialized = true;
        }
        Ok(())
    }

    pub async fn find_text(
        &self,
        image: &[u8],
        target: &str,
        options: FindTextOptions,
    ) -> Result<TextSearchResult, OcrError> {
        let key = (blake3::hash(image), target.to_string(), options);
        if options.use_cache
            && let Some(hit) = self.cache.lock().await.get(&key)
        {
            return Ok(hit.clone());
        }

        self.ensure_initialized().await?;
        let result = {
            let slot = self.slot.lock().await;
            slot.engine.find_text(image, target, options).await?
        };

        if options.use_cache {
            let mut cache = self.cache.lock().await;
            if cache.len() >= CACHE_CAPACITY {
                cache.clear();
            }
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn terminate(&self) -> Result<(), OcrError> {
        let mut slot = self.slot.lock().await;
        if slot.initialized {
            slot.engine.terminate().await?;
            slot.initialized = false;
        }
        self.cache.lock().await.clear();
        Ok(())
    }
}
