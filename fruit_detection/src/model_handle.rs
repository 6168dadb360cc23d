use crate::{error::DetectionError, model_service::ModelService};
use once_cell::sync::OnceCell;
use std::sync::Arc;

type Loader = Box<dyn Fn() -> Result<Arc<dyn ModelService>, DetectionError> + Send + Sync>;

/// Process-wide model handle, loaded on first use and kept for the life of
/// the process. Concurrent first callers wait on a single load; a failed load
/// is not cached.
pub struct LazyModel {
    cell: OnceCell<Arc<dyn ModelService>>,
    loader: Loader,
}

impl LazyModel {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ModelService>, DetectionError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    pub fn loaded(model: Arc<dyn ModelService>) -> Self {
        Self {
            cell: OnceCell::with_value(model),
            loader: Box::new(|| {
                Err(DetectionError::ModelLoad(
                    "model handle has no loader".to_string(),
                ))
            }),
        }
    }

    pub fn get(&self) -> Result<Arc<dyn ModelService>, DetectionError> {
        self.cell
            .get_or_try_init(|| {
                tracing::info!("First request, loading model");
                let model = (self.loader)()?;
                tracing::info!("Model loaded successfully");
                Ok(model)
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
