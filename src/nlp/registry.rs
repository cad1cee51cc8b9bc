//! Startup-built table of loaded model handles.

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    config::{ModelEntry, ModelSettings},
    error::NlpError,
    nlp::models::{
        EnsembleTranslator, QuestionAnswerer, TokenClassifier, TranslationHandle, Translator,
        ZeroShotClassifier,
    },
};

/// File whose presence marks a standard encoder/decoder translation export.
pub const STANDARD_TRANSLATION_MARKER: &str = "encoder_model.onnx";

/// Task families served by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Task {
    Ner,
    QuestionAnswering,
    ZeroShot,
    Translation(String),
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Ner => f.write_str("ner"),
            Task::QuestionAnswering => f.write_str("question-answering"),
            Task::ZeroShot => f.write_str("zero-shot"),
            Task::Translation(variant) => write!(f, "translation:{variant}"),
        }
    }
}

/// A loaded model bound to one task family.
#[derive(Clone)]
pub enum ModelHandle {
    Ner(Arc<dyn TokenClassifier>),
    QuestionAnswering(Arc<dyn QuestionAnswerer>),
    ZeroShot(Arc<dyn ZeroShotClassifier>),
    Translation(TranslationHandle),
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Ner(_) => f.write_str("ModelHandle::Ner"),
            ModelHandle::QuestionAnswering(_) => f.write_str("ModelHandle::QuestionAnswering"),
            ModelHandle::ZeroShot(_) => f.write_str("ModelHandle::ZeroShot"),
            ModelHandle::Translation(handle) => write!(f, "ModelHandle::Translation({handle:?})"),
        }
    }
}

/// Constructs model handles from directories on disk.
pub trait ModelLoader {
    fn load_ner(&self, path: &Path) -> Result<Arc<dyn TokenClassifier>, NlpError>;
    fn load_question_answering(&self, path: &Path)
        -> Result<Arc<dyn QuestionAnswerer>, NlpError>;
    fn load_zero_shot(&self, path: &Path) -> Result<Arc<dyn ZeroShotClassifier>, NlpError>;
    fn load_translation(&self, path: &Path) -> Result<Arc<dyn Translator>, NlpError>;

    /// `Ok(None)` means this loader cannot build ensembles at all.
    fn load_ensemble(
        &self,
        path: &Path,
    ) -> Result<Option<Arc<dyn EnsembleTranslator>>, NlpError>;
}

/// Loader used when the crate is built without an inference runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedLoader;

impl ModelLoader for UnsupportedLoader {
    fn load_ner(&self, _path: &Path) -> Result<Arc<dyn TokenClassifier>, NlpError> {
        Err(NlpError::Unsupported { task: "ner".into() })
    }

    fn load_question_answering(
        &self,
        _path: &Path,
    ) -> Result<Arc<dyn QuestionAnswerer>, NlpError> {
        Err(NlpError::Unsupported {
            task: "question-answering".into(),
        })
    }

    fn load_zero_shot(&self, _path: &Path) -> Result<Arc<dyn ZeroShotClassifier>, NlpError> {
        Err(NlpError::Unsupported {
            task: "zero-shot".into(),
        })
    }

    fn load_translation(&self, _path: &Path) -> Result<Arc<dyn Translator>, NlpError> {
        Err(NlpError::Unsupported {
            task: "translation".into(),
        })
    }

    fn load_ensemble(
        &self,
        _path: &Path,
    ) -> Result<Option<Arc<dyn EnsembleTranslator>>, NlpError> {
        Ok(None)
    }
}

/// Loader matching the enabled cargo features.
pub fn default_loader(inference_threads: usize) -> Box<dyn ModelLoader + Send + Sync> {
    #[cfg(feature = "onnx")]
    {
        Box::new(crate::nlp::onnx::OnnxLoader::new(inference_threads))
    }
    #[cfg(not(feature = "onnx"))]
    {
        let _ = inference_threads;
        Box::new(UnsupportedLoader)
    }
}

/// Immutable lookup table of the models loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    handles: HashMap<Task, ModelHandle>,
}

impl ModelRegistry {
    /// Build every enabled entry. Failures are fatal except for ensembles.
    pub fn build(settings: &ModelSettings, loader: &dyn ModelLoader) -> Result<Self> {
        let mut handles = HashMap::new();

        if let Some(model) = load_entry(&Task::Ner, &settings.ner, |p| loader.load_ner(p))? {
            handles.insert(Task::Ner, ModelHandle::Ner(model));
        }
        if let Some(model) = load_entry(&Task::QuestionAnswering, &settings.question_answering, |p| {
            loader.load_question_answering(p)
        })? {
            handles.insert(Task::QuestionAnswering, ModelHandle::QuestionAnswering(model));
        }
        if let Some(model) = load_entry(&Task::ZeroShot, &settings.zero_shot, |p| {
            loader.load_zero_shot(p)
        })? {
            handles.insert(Task::ZeroShot, ModelHandle::ZeroShot(model));
        }

        for translation in &settings.translation {
            let task = Task::Translation(translation.variant.clone());
            let entry = &translation.entry;
            if !entry.is_available() {
                skip(&task, entry);
                continue;
            }
            let handle = if entry.path.join(STANDARD_TRANSLATION_MARKER).is_file() {
                let model = loader
                    .load_translation(&entry.path)
                    .with_context(|| format!("loading {task} from {}", entry.path.display()))?;
                Some(TranslationHandle::Standard(model))
            } else {
                load_ensemble(&task, &entry.path, loader)
            };
            if let Some(handle) = handle {
                info!(%task, kind = handle.kind(), path = %entry.path.display(), "loaded model");
                handles.insert(task, ModelHandle::Translation(handle));
            }
        }

        Ok(Self { handles })
    }

    /// Look up the handle for a task, `None` when absent or disabled.
    pub fn resolve(&self, task: &Task) -> Option<&ModelHandle> {
        self.handles.get(task)
    }

    pub fn ner(&self) -> Option<Arc<dyn TokenClassifier>> {
        match self.resolve(&Task::Ner)? {
            ModelHandle::Ner(model) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn question_answering(&self) -> Option<Arc<dyn QuestionAnswerer>> {
        match self.resolve(&Task::QuestionAnswering)? {
            ModelHandle::QuestionAnswering(model) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn zero_shot(&self) -> Option<Arc<dyn ZeroShotClassifier>> {
        match self.resolve(&Task::ZeroShot)? {
            ModelHandle::ZeroShot(model) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn translation(&self, variant: &str) -> Option<TranslationHandle> {
        match self.resolve(&Task::Translation(variant.to_string()))? {
            ModelHandle::Translation(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Names of loaded tasks, sorted.
    pub fn loaded_tasks(&self) -> Vec<String> {
        let mut tasks: Vec<String> = self.handles.keys().map(Task::to_string).collect();
        tasks.sort();
        tasks
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn skip(task: &Task, entry: &ModelEntry) {
    if entry.load {
        info!(%task, path = %entry.path.display(), "model directory missing; not loaded");
    } else {
        info!(%task, "model disabled by configuration");
    }
}

fn load_entry<T, F>(task: &Task, entry: &ModelEntry, load: F) -> Result<Option<T>>
where
    F: FnOnce(&Path) -> Result<T, NlpError>,
{
    if !entry.is_available() {
        skip(task, entry);
        return Ok(None);
    }
    let model = load(&entry.path)
        .with_context(|| format!("loading {task} from {}", entry.path.display()))?;
    info!(%task, path = %entry.path.display(), "loaded model");
    Ok(Some(model))
}

fn load_ensemble(task: &Task, path: &Path, loader: &dyn ModelLoader) -> Option<TranslationHandle> {
    match loader.load_ensemble(path) {
        Ok(Some(model)) => Some(TranslationHandle::Ensemble(model)),
        Ok(None) => {
            warn!(%task, "ensemble models are not supported by this build");
            None
        }
        Err(err) => {
            warn!(%task, path = %path.display(), error = %err, "ensemble model not loaded");
            None
        }
    }
}
