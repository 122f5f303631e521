use std::fmt::Write as _;

use crate::attributes::{AgeRange, Ethnicity, Expression, Gender, HairColor, SceneStyle};
use crate::llm::media::ImageData;
use crate::state::{FaceOrigin, GeneratedFace, SessionState};

fn image_label(image: &ImageData) -> String {
    let kb = image.approx_bytes() as f64 / 1024.0;
    format!("{}, ~{:.0} KB", image.mime_type, kb)
}

fn origin_label(origin: FaceOrigin) -> &'static str {
    match origin {
        FaceOrigin::Generated => "generated",
        FaceOrigin::Uploaded => "uploaded",
    }
}

fn choices<T: std::fmt::Display>(all: &[T]) -> String {
    all.iter()
        .map(|choice| choice.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn face_line(face: &GeneratedFace) -> String {
    let attrs = &face.source_attributes;
    let description = if attrs.free_text.trim().is_empty() {
        "-".to_string()
    } else {
        attrs.free_text.trim().to_string()
    };
    format!(
        "{} ({}) age={} gender={} ethnicity={} hair={} description={}",
        origin_label(face.origin),
        image_label(&face.image),
        attrs.age_range,
        attrs.gender,
        attrs.ethnicity,
        attrs.hair_color,
        description
    )
}

pub fn render_status(state: &SessionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", state.stage);

    let form = &state.face_form;
    let _ = writeln!(
        out,
        "Face form: description={:?} age={} gender={} ethnicity={} hair={}",
        form.free_text, form.age_range, form.gender, form.ethnicity, form.hair_color
    );

    match &state.current_face {
        Some(face) => {
            let _ = writeln!(out, "Face: {}", face_line(face));
        }
        None if state.loading.face => {
            let _ = writeln!(out, "Face: generating...");
        }
        None => {
            let _ = writeln!(out, "Face: none yet");
        }
    }

    let scene = &state.scene_form;
    let _ = writeln!(
        out,
        "Scene form: prompt={:?} expression={} style={}",
        scene.raw_prompt, scene.expression, scene.style
    );

    if let Some(progress) = state.scene_progress {
        let _ = writeln!(out, "Scene: {progress}");
    } else if let Some(image) = &state.current_scene {
        let _ = writeln!(out, "Scene: {}", image_label(image));
    } else {
        let _ = writeln!(out, "Scene: none yet");
    }

    if state.loading.suggestions {
        let _ = writeln!(out, "Ideas: thinking about {:?}...", state.suggestion_topic);
    } else if !state.suggestions.is_empty() {
        let _ = writeln!(out, "Ideas for {:?}:", state.suggestion_topic);
        for (index, suggestion) in state.suggestions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", index + 1, suggestion);
        }
    }

    let _ = writeln!(
        out,
        "History: {} face(s), {} scene(s)",
        state.face_history.len(),
        state.scene_history.len()
    );

    if let Some(error) = &state.error {
        let _ = writeln!(out, "Error: {error}");
    }

    out
}

pub fn render_face_history(state: &SessionState) -> String {
    if state.face_history.is_empty() {
        return "No faces yet.".to_string();
    }
    let current = state.current_face.as_ref().map(|face| &face.image);
    state
        .face_history
        .iter()
        .enumerate()
        .map(|(index, face)| {
            let marker = if Some(&face.image) == current { "*" } else { " " };
            format!("{marker}{}. {}", index + 1, face_line(face))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_scene_history(state: &SessionState) -> String {
    if state.scene_history.is_empty() {
        return "No scenes yet.".to_string();
    }
    state
        .scene_history
        .iter()
        .enumerate()
        .map(|(index, image)| {
            let marker = if state.current_scene.as_ref() == Some(image) {
                "*"
            } else {
                " "
            };
            format!("{marker}{}. {}", index + 1, image_label(image))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn help_text() -> String {
    format!(
        "Step 1, describe or upload a face:
  describe <text>         free-text description
  age <value>             {}
  gender <value>          {}
  ethnicity <value>       {}
  hair <value>            {}
  face                    generate the face
  upload <path>           use a JPEG or PNG file as the face
Step 2, place the face in a scene:
  scene <text>            describe the lifestyle scene
  expression <value>      {}
  style <value>           {}
  create                  create the scene
  ideas <topic>           ask for 3 scene ideas
  use <n>                 copy idea n into the scene description
History and output:
  faces / pick-face <n>   list or reuse generated faces
  scenes / pick-scene <n> list or reuse created scenes
  save face|scene [path]  write the current image to disk
  status | reset | help | quit",
        choices(AgeRange::ALL),
        choices(Gender::ALL),
        choices(Ethnicity::ALL),
        choices(HairColor::ALL),
        choices(Expression::ALL),
        choices(SceneStyle::ALL),
    )
}
