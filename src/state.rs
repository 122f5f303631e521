use std::fmt;

use crate::attributes::{FaceAttributes, SceneRequest};
use crate::errors::Pipeline;
use crate::llm::media::ImageData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkflowStage {
    #[default]
    Face,
    Lifestyle,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStage::Face => f.write_str("Step 1: Face"),
            WorkflowStage::Lifestyle => f.write_str("Step 2: Lifestyle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceOrigin {
    Generated,
    Uploaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFace {
    pub image: ImageData,
    pub source_attributes: FaceAttributes,
    pub origin: FaceOrigin,
}

/// Anything that can sit in a history list; identity is the image handle.
pub trait HistoryEntry: Clone {
    fn image(&self) -> &ImageData;
}

impl HistoryEntry for GeneratedFace {
    fn image(&self) -> &ImageData {
        &self.image
    }
}

impl HistoryEntry for ImageData {
    fn image(&self) -> &ImageData {
        self
    }
}

/// Most-recent-first list with at most one entry per image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History<T> {
    entries: Vec<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: HistoryEntry> History<T> {
    /// Inserts at the front, dropping any older entry with the same image.
    pub fn promote(&mut self, entry: T) {
        self.entries
            .retain(|existing| existing.image() != entry.image());
        self.entries.insert(0, entry);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingFlags {
    pub face: bool,
    pub scene: bool,
    pub suggestions: bool,
}

impl LoadingFlags {
    pub fn get(&self, pipeline: Pipeline) -> bool {
        match pipeline {
            Pipeline::Face => self.face,
            Pipeline::Scene => self.scene,
            Pipeline::Suggestions => self.suggestions,
        }
    }

    pub fn set(&mut self, pipeline: Pipeline, value: bool) {
        match pipeline {
            Pipeline::Face => self.face = value,
            Pipeline::Scene => self.scene = value,
            Pipeline::Suggestions => self.suggestions = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneProgress {
    AnalyzingPrompt,
    CreatingScene,
}

impl fmt::Display for SceneProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneProgress::AnalyzingPrompt => f.write_str("Analyzing prompt..."),
            SceneProgress::CreatingScene => f.write_str("Creating scene..."),
        }
    }
}

/// Everything the view renders. Only `WorkflowController` mutates it; the
/// view works from cloned snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub stage: WorkflowStage,
    pub face_form: FaceAttributes,
    pub scene_form: SceneRequest,
    pub suggestion_topic: String,
    pub current_face: Option<GeneratedFace>,
    pub current_scene: Option<ImageData>,
    pub suggestions: Vec<String>,
    pub face_history: History<GeneratedFace>,
    pub scene_history: History<ImageData>,
    pub loading: LoadingFlags,
    pub scene_progress: Option<SceneProgress>,
    pub error: Option<String>,
}

impl SessionState {
    /// Installs `face` as the working face and drops everything that was
    /// derived from the previous one.
    pub fn enter_lifestyle(&mut self, face: GeneratedFace) {
        self.face_history.promote(face.clone());
        self.current_face = Some(face);
        self.clear_lifestyle_work();
        self.stage = WorkflowStage::Lifestyle;
    }

    pub fn clear_lifestyle_work(&mut self) {
        self.current_scene = None;
        self.suggestions.clear();
        self.suggestion_topic.clear();
        self.scene_form.raw_prompt.clear();
        self.scene_history.clear();
        self.loading.scene = false;
        self.loading.suggestions = false;
        self.scene_progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(data: &str) -> GeneratedFace {
        GeneratedFace {
            image: ImageData::new("image/jpeg", data),
            source_attributes: FaceAttributes::default(),
            origin: FaceOrigin::Generated,
        }
    }

    #[test]
    fn promote_deduplicates_and_moves_to_front() {
        let mut history = History::default();
        history.promote(face("a"));
        history.promote(face("b"));
        history.promote(face("a"));

        let order: Vec<_> = history.iter().map(|f| f.image.data.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn same_data_different_mime_is_a_different_image() {
        let mut history = History::default();
        history.promote(ImageData::new("image/png", "x"));
        history.promote(ImageData::new("image/jpeg", "x"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn entering_lifestyle_resets_scene_work() {
        let mut state = SessionState::default();
        state.current_scene = Some(ImageData::new("image/png", "old"));
        state.scene_history.promote(ImageData::new("image/png", "old"));
        state.suggestions = vec!["idea".to_string()];
        state.scene_form.raw_prompt = "beach".to_string();

        state.enter_lifestyle(face("new"));

        assert_eq!(state.stage, WorkflowStage::Lifestyle);
        assert!(state.current_scene.is_none());
        assert!(state.scene_history.is_empty());
        assert!(state.suggestions.is_empty());
        assert!(state.scene_form.raw_prompt.is_empty());
        assert_eq!(state.face_history.len(), 1);
    }
}
