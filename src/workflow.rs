use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::attributes::{FaceAttributes, SceneRequest};
use crate::errors::{Pipeline, WorkflowError, WorkflowResult};
use crate::llm::backend::GenerativeBackend;
use crate::llm::gateway::{GenerationGateway, ModelSet};
use crate::llm::media::{ImageData, UploadedImage};
use crate::llm::sanitizer::SuggestionSanitizer;
use crate::prompts::{build_face_prompt, build_scene_prompt, build_suggestion_prompt};
use crate::state::{FaceOrigin, GeneratedFace, SceneProgress, SessionState, WorkflowStage};

/// Outcome of a pipeline whose result arrived. `Superseded` means a newer
/// action invalidated the request while it was in flight and its result
/// was dropped without touching the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Applied(T),
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    pipeline: Pipeline,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tickets {
    face: u64,
    scene: u64,
    suggestions: u64,
}

impl Tickets {
    fn slot(&mut self, pipeline: Pipeline) -> &mut u64 {
        match pipeline {
            Pipeline::Face => &mut self.face,
            Pipeline::Scene => &mut self.scene,
            Pipeline::Suggestions => &mut self.suggestions,
        }
    }

    fn issue(&mut self, pipeline: Pipeline) -> Ticket {
        let slot = self.slot(pipeline);
        *slot += 1;
        Ticket {
            pipeline,
            seq: *slot,
        }
    }

    fn invalidate(&mut self, pipeline: Pipeline) {
        *self.slot(pipeline) += 1;
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        let latest = match ticket.pipeline {
            Pipeline::Face => self.face,
            Pipeline::Scene => self.scene,
            Pipeline::Suggestions => self.suggestions,
        };
        latest == ticket.seq
    }
}

#[derive(Debug, Default)]
struct Session {
    state: SessionState,
    tickets: Tickets,
}

impl Session {
    fn record_error(&mut self, err: &WorkflowError) {
        self.state.error = Some(err.to_string());
    }

    fn invalidate_lifestyle_pipelines(&mut self) {
        self.tickets.invalidate(Pipeline::Scene);
        self.tickets.invalidate(Pipeline::Suggestions);
    }

    fn install_face(&mut self, face: GeneratedFace) {
        self.invalidate_lifestyle_pipelines();
        self.state.enter_lifestyle(face);
    }
}

/// Owns the session and sequences the face → lifestyle workflow.
///
/// Commands lock the session only between suspension points, so the three
/// pipelines can run interleaved. Each pipeline start issues a ticket; a
/// result whose ticket is no longer current is discarded.
pub struct WorkflowController {
    session: Mutex<Session>,
    gateway: GenerationGateway,
    sanitizer: SuggestionSanitizer,
}

impl WorkflowController {
    pub fn new(backend: Arc<dyn GenerativeBackend>, models: ModelSet) -> Self {
        let sanitizer = SuggestionSanitizer::new(backend.clone(), models.text.clone());
        Self {
            session: Mutex::new(Session::default()),
            gateway: GenerationGateway::new(backend, models),
            sanitizer,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.session.lock().state.clone()
    }

    pub fn edit_face_form(&self, edit: impl FnOnce(&mut FaceAttributes)) {
        edit(&mut self.session.lock().state.face_form);
    }

    pub fn edit_scene_form(&self, edit: impl FnOnce(&mut SceneRequest)) {
        edit(&mut self.session.lock().state.scene_form);
    }

    fn fail<T>(&self, session: &mut Session, err: WorkflowError) -> WorkflowResult<T> {
        info!("Workflow command rejected: {}", err);
        session.record_error(&err);
        Err(err)
    }

    /// Checks re-entry, runs `prepare` against the session and, when it
    /// succeeds, marks the pipeline as loading under a fresh ticket.
    fn begin<P>(
        &self,
        pipeline: Pipeline,
        prepare: impl FnOnce(&mut SessionState) -> WorkflowResult<P>,
    ) -> WorkflowResult<(Ticket, P)> {
        let mut session = self.session.lock();
        if session.state.loading.get(pipeline) {
            info!("{} already running, request rejected", pipeline);
            return Err(WorkflowError::Busy(pipeline));
        }
        let prepared = match prepare(&mut session.state) {
            Ok(prepared) => prepared,
            Err(err) => return self.fail(&mut session, err),
        };
        session.state.error = None;
        session.state.loading.set(pipeline, true);
        let ticket = session.tickets.issue(pipeline);
        debug!("{} started (ticket={})", pipeline, ticket.seq);
        Ok((ticket, prepared))
    }

    fn finish<T, R>(
        &self,
        ticket: Ticket,
        result: WorkflowResult<T>,
        apply: impl FnOnce(&mut Session, T) -> R,
    ) -> WorkflowResult<Completion<R>> {
        let mut session = self.session.lock();
        if !session.tickets.is_current(ticket) {
            info!("Discarding stale {} result (ticket={})", ticket.pipeline, ticket.seq);
            return Ok(Completion::Superseded);
        }
        session.state.loading.set(ticket.pipeline, false);
        if ticket.pipeline == Pipeline::Scene {
            session.state.scene_progress = None;
        }
        match result {
            Ok(value) => Ok(Completion::Applied(apply(&mut session, value))),
            Err(err) => self.fail(&mut session, err),
        }
    }

    pub async fn submit_face(
        &self,
        attrs: FaceAttributes,
    ) -> WorkflowResult<Completion<GeneratedFace>> {
        let (ticket, prompt) = self.begin(Pipeline::Face, |state| {
            if attrs.is_unconstrained() {
                return Err(WorkflowError::validation(
                    "Please provide a description for the face.",
                ));
            }
            state.face_form = attrs.clone();
            Ok(build_face_prompt(&attrs))
        })?;

        info!("Generating face");
        let result = self.gateway.generate_face(&prompt).await;

        self.finish(ticket, result, |session, image| {
            let face = GeneratedFace {
                image,
                source_attributes: attrs,
                origin: FaceOrigin::Generated,
            };
            session.install_face(face.clone());
            face
        })
    }

    pub fn upload_face(&self, upload: UploadedImage) -> WorkflowResult<GeneratedFace> {
        let mut session = self.session.lock();
        if session.state.loading.face {
            info!("Upload rejected while face generation runs");
            return Err(WorkflowError::Busy(Pipeline::Face));
        }
        let image = match upload.into_image() {
            Ok(image) => image,
            Err(err) => return self.fail(&mut session, err),
        };

        let face = GeneratedFace {
            image,
            source_attributes: session.state.face_form.clone(),
            origin: FaceOrigin::Uploaded,
        };
        session.state.error = None;
        session.install_face(face.clone());
        info!("Face uploaded (mime={})", face.image.mime_type);
        Ok(face)
    }

    pub async fn submit_scene(&self, request: SceneRequest) -> WorkflowResult<Completion<ImageData>> {
        let (ticket, face) = self.begin(Pipeline::Scene, |state| {
            if request.raw_prompt.trim().is_empty() {
                return Err(WorkflowError::validation(
                    "Please provide a description for the lifestyle scene.",
                ));
            }
            let face = match (&state.stage, &state.current_face) {
                (WorkflowStage::Lifestyle, Some(face)) => face.image.clone(),
                _ => {
                    return Err(WorkflowError::validation(
                        "A face image must be generated or uploaded first.",
                    ))
                }
            };
            state.scene_form = request.clone();
            state.scene_progress = Some(SceneProgress::AnalyzingPrompt);
            Ok(face)
        })?;

        let cleaned = self.sanitizer.sanitize(request.raw_prompt.trim()).await;

        {
            let mut session = self.session.lock();
            if !session.tickets.is_current(ticket) {
                info!("Scene request superseded during prompt analysis");
                return Ok(Completion::Superseded);
            }
            session.state.scene_progress = Some(SceneProgress::CreatingScene);
        }

        let prompt = build_scene_prompt(&cleaned, request.expression, request.style);
        info!(
            "Compositing scene (expression={}, style={})",
            request.expression, request.style
        );
        let result = self.gateway.composite_scene(&face, &prompt).await;

        self.finish(ticket, result, |session, image| {
            session.state.scene_history.promote(image.clone());
            session.state.current_scene = Some(image.clone());
            image
        })
    }

    pub async fn request_suggestions(
        &self,
        topic: &str,
    ) -> WorkflowResult<Completion<Vec<String>>> {
        let (ticket, prompt) = self.begin(Pipeline::Suggestions, |state| {
            let description = state.face_form.free_text.trim();
            if description.is_empty() {
                return Err(WorkflowError::validation(
                    "Please provide a face description first.",
                ));
            }
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(WorkflowError::validation(
                    "Please enter a topic for scene ideas.",
                ));
            }
            let prompt = build_suggestion_prompt(description, topic);
            state.suggestion_topic = topic.to_string();
            state.suggestions.clear();
            Ok(prompt)
        })?;

        let result = self.gateway.fetch_suggestions(&prompt).await;

        self.finish(ticket, result, |session, suggestions| {
            info!("Received {} scene suggestion(s)", suggestions.len());
            session.state.suggestions = suggestions.clone();
            suggestions
        })
    }

    /// Copies suggestion `index` into the scene draft.
    pub fn choose_suggestion(&self, index: usize) -> WorkflowResult<String> {
        let mut session = self.session.lock();
        let Some(suggestion) = session.state.suggestions.get(index).cloned() else {
            return self.fail(
                &mut session,
                WorkflowError::validation(format!("There is no idea number {}.", index + 1)),
            );
        };
        session.state.scene_form.raw_prompt = suggestion.clone();
        Ok(suggestion)
    }

    /// Makes history entry `index` the working face again without calling
    /// the backend. An in-flight face generation is superseded.
    pub fn select_from_face_history(&self, index: usize) -> WorkflowResult<GeneratedFace> {
        let mut session = self.session.lock();
        let Some(face) = session.state.face_history.get(index).cloned() else {
            return self.fail(
                &mut session,
                WorkflowError::validation(format!("There is no face number {}.", index + 1)),
            );
        };

        if session.state.loading.face {
            session.tickets.invalidate(Pipeline::Face);
            session.state.loading.face = false;
        }
        session.state.error = None;
        session.state.face_form = face.source_attributes.clone();
        session.install_face(face.clone());
        Ok(face)
    }

    pub fn select_from_scene_history(&self, index: usize) -> WorkflowResult<ImageData> {
        let mut session = self.session.lock();
        let Some(image) = session.state.scene_history.get(index).cloned() else {
            return self.fail(
                &mut session,
                WorkflowError::validation(format!("There is no scene number {}.", index + 1)),
            );
        };
        session.state.scene_history.promote(image.clone());
        session.state.current_scene = Some(image.clone());
        Ok(image)
    }

    /// Back to the initial snapshot; every in-flight result becomes stale.
    pub fn reset(&self) {
        let mut session = self.session.lock();
        session.tickets.invalidate(Pipeline::Face);
        session.invalidate_lifestyle_pipelines();
        session.state = SessionState::default();
        info!("Session reset");
    }
}
