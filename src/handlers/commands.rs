use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tracing::error;

use crate::attributes::{AgeRange, Ethnicity, Expression, Gender, HairColor, SceneStyle};
use crate::config::Config;
use crate::errors::WorkflowResult;
use crate::handlers::render::{
    face_line, help_text, render_face_history, render_scene_history, render_status,
};
use crate::llm::media::{extension_for_mime, ImageData, UploadedImage};
use crate::utils::timing::ActionTimer;
use crate::workflow::{Completion, WorkflowController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Face,
    Scene,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Describe(String),
    Age(AgeRange),
    Gender(Gender),
    Ethnicity(Ethnicity),
    Hair(HairColor),
    Face,
    Upload(PathBuf),
    Scene(String),
    Expression(Expression),
    Style(SceneStyle),
    Create,
    Ideas(String),
    Use(usize),
    Faces,
    PickFace(usize),
    Scenes,
    PickScene(usize),
    Save {
        target: SaveTarget,
        path: Option<PathBuf>,
    },
    Reset,
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Status => "status",
            Command::Describe(_) => "describe",
            Command::Age(_) => "age",
            Command::Gender(_) => "gender",
            Command::Ethnicity(_) => "ethnicity",
            Command::Hair(_) => "hair",
            Command::Face => "face",
            Command::Upload(_) => "upload",
            Command::Scene(_) => "scene",
            Command::Expression(_) => "expression",
            Command::Style(_) => "style",
            Command::Create => "create",
            Command::Ideas(_) => "ideas",
            Command::Use(_) => "use",
            Command::Faces => "faces",
            Command::PickFace(_) => "pick-face",
            Command::Scenes => "scenes",
            Command::PickScene(_) => "pick-scene",
            Command::Save { .. } => "save",
            Command::Reset => "reset",
            Command::Quit => "quit",
        }
    }
}

fn required_arg<'a>(command: &str, arg: &'a str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("Usage: {command} <value>"))
    } else {
        Ok(arg)
    }
}

/// One-based position as typed by the user, returned zero-based.
fn parse_position(command: &str, arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(position) if position > 0 => Ok(position - 1),
        _ => Err(format!("Usage: {command} <number>, counting from 1")),
    }
}

fn parse_choice<T>(command: &str, arg: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    required_arg(command, arg)?
        .parse::<T>()
        .map_err(|err| err.to_string())
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (keyword, arg) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let command = match keyword.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "status" => Command::Status,
        "describe" => Command::Describe(arg.to_string()),
        "age" => Command::Age(parse_choice("age", arg)?),
        "gender" => Command::Gender(parse_choice("gender", arg)?),
        "ethnicity" => Command::Ethnicity(parse_choice("ethnicity", arg)?),
        "hair" => Command::Hair(parse_choice("hair", arg)?),
        "face" => Command::Face,
        "upload" => Command::Upload(PathBuf::from(required_arg("upload", arg)?)),
        "scene" => Command::Scene(arg.to_string()),
        "expression" => Command::Expression(parse_choice("expression", arg)?),
        "style" => Command::Style(parse_choice("style", arg)?),
        "create" => Command::Create,
        "ideas" => Command::Ideas(arg.to_string()),
        "use" => Command::Use(parse_position("use", arg)?),
        "faces" => Command::Faces,
        "pick-face" => Command::PickFace(parse_position("pick-face", arg)?),
        "scenes" => Command::Scenes,
        "pick-scene" => Command::PickScene(parse_position("pick-scene", arg)?),
        "save" => {
            let (target, path) = match arg.split_once(char::is_whitespace) {
                Some((target, path)) => (target, Some(PathBuf::from(path.trim()))),
                None => (arg, None),
            };
            let target = match target.to_lowercase().as_str() {
                "face" => SaveTarget::Face,
                "scene" => SaveTarget::Scene,
                _ => return Err("Usage: save face|scene [path]".to_string()),
            };
            Command::Save { target, path }
        }
        "reset" => Command::Reset,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command '{other}'. Type 'help' for the list.")),
    };

    Ok(Some(command))
}

fn report<T>(result: &WorkflowResult<T>, success: impl FnOnce(&T) -> String) {
    match result {
        Ok(value) => println!("{}", success(value)),
        Err(err) => println!("Error: {err}"),
    }
}

fn report_completion<T>(
    timer: &mut ActionTimer,
    result: WorkflowResult<Completion<T>>,
    success: impl FnOnce(&T) -> String,
) {
    match &result {
        Ok(Completion::Applied(value)) => {
            timer.complete("success", None);
            println!("{}", success(value));
        }
        Ok(Completion::Superseded) => {
            timer.complete("superseded", None);
        }
        Err(err) => {
            timer.complete("error", Some(err.to_string()));
            println!("Error: {err}");
        }
    }
}

fn default_save_path(output_dir: &Path, target: SaveTarget, image: &ImageData) -> PathBuf {
    let stem = match target {
        SaveTarget::Face => "generated-face",
        SaveTarget::Scene => "lifestyle-scene",
    };
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    output_dir.join(format!(
        "{stem}-{stamp}.{}",
        extension_for_mime(&image.mime_type)
    ))
}

async fn save_image(image: &ImageData, path: &Path) -> Result<()> {
    let bytes = image
        .decode()
        .map_err(|err| anyhow!("Image data is not valid base64: {err}"))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn save_handler(
    controller: &WorkflowController,
    config: &Config,
    target: SaveTarget,
    path: Option<PathBuf>,
) -> Result<PathBuf> {
    let state = controller.snapshot();
    let image = match target {
        SaveTarget::Face => state.current_face.map(|face| face.image),
        SaveTarget::Scene => state.current_scene,
    }
    .ok_or_else(|| anyhow!("There is no {} image to save yet.", match target {
        SaveTarget::Face => "face",
        SaveTarget::Scene => "scene",
    }))?;

    let path = path.unwrap_or_else(|| default_save_path(&config.output_dir, target, &image));
    save_image(&image, &path).await?;
    Ok(path)
}

fn face_handler(controller: Arc<WorkflowController>) {
    let attrs = controller.snapshot().face_form;
    let mut timer = ActionTimer::start("face", Some(attrs.free_text.as_str()));
    println!("Generating face...");
    tokio::spawn(async move {
        let result = controller.submit_face(attrs).await;
        report_completion(&mut timer, result, |face| {
            format!("Face ready: {}\nNow describe a scene and type 'create'.", face_line(face))
        });
    });
}

fn create_handler(controller: Arc<WorkflowController>) {
    let request = controller.snapshot().scene_form;
    let mut timer = ActionTimer::start("create", Some(request.raw_prompt.as_str()));
    println!("Analyzing prompt...");
    tokio::spawn(async move {
        let result = controller.submit_scene(request).await;
        report_completion(&mut timer, result, |image| {
            format!(
                "Scene ready ({}). Type 'save scene' to write it to disk.",
                image.mime_type
            )
        });
    });
}

fn ideas_handler(controller: Arc<WorkflowController>, topic: String) {
    let mut timer = ActionTimer::start("ideas", Some(topic.as_str()));
    println!("Thinking of ideas...");
    tokio::spawn(async move {
        let result = controller.request_suggestions(&topic).await;
        report_completion(&mut timer, result, |ideas| {
            let mut lines = vec!["Ideas:".to_string()];
            lines.extend(
                ideas
                    .iter()
                    .enumerate()
                    .map(|(index, idea)| format!("  {}. {}", index + 1, idea)),
            );
            lines.push("Type 'use <n>' to copy one into the scene description.".to_string());
            lines.join("\n")
        });
    });
}

async fn upload_handler(controller: &WorkflowController, path: &Path) {
    let mut timer = ActionTimer::start("upload", path.to_str());
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to read upload {}: {}", path.display(), err);
            timer.complete("error", Some(err.to_string()));
            println!("Error: Failed to read the uploaded file.");
            return;
        }
    };
    let result = controller.upload_face(UploadedImage::sniffed(bytes));
    timer.complete_with(&result);
    report(&result, |face| format!("Face ready: {}", face_line(face)));
}

/// Runs one parsed command. Pipelines are spawned so the prompt stays
/// responsive while they run.
pub async fn handle_command(
    controller: Arc<WorkflowController>,
    config: &Config,
    command: Command,
) {
    match command {
        Command::Help => println!("{}", help_text()),
        Command::Status => print!("{}", render_status(&controller.snapshot())),
        Command::Describe(text) => {
            controller.edit_face_form(|form| form.free_text = text);
        }
        Command::Age(value) => controller.edit_face_form(|form| form.age_range = value),
        Command::Gender(value) => controller.edit_face_form(|form| form.gender = value),
        Command::Ethnicity(value) => controller.edit_face_form(|form| form.ethnicity = value),
        Command::Hair(value) => controller.edit_face_form(|form| form.hair_color = value),
        Command::Face => face_handler(controller),
        Command::Upload(path) => upload_handler(&controller, &path).await,
        Command::Scene(text) => controller.edit_scene_form(|form| form.raw_prompt = text),
        Command::Expression(value) => controller.edit_scene_form(|form| form.expression = value),
        Command::Style(value) => controller.edit_scene_form(|form| form.style = value),
        Command::Create => create_handler(controller),
        Command::Ideas(topic) => ideas_handler(controller, topic),
        Command::Use(index) => {
            let result = controller.choose_suggestion(index);
            report(&result, |idea| format!("Scene description set to: {idea}"));
        }
        Command::Faces => println!("{}", render_face_history(&controller.snapshot())),
        Command::PickFace(index) => {
            let result = controller.select_from_face_history(index);
            report(&result, |face| format!("Using face: {}", face_line(face)));
        }
        Command::Scenes => println!("{}", render_scene_history(&controller.snapshot())),
        Command::PickScene(index) => {
            let result = controller.select_from_scene_history(index);
            report(&result, |image| format!("Showing scene ({})", image.mime_type));
        }
        Command::Save { target, path } => {
            let mut timer = ActionTimer::start("save", None);
            match save_handler(&controller, config, target, path).await {
                Ok(path) => {
                    timer.complete("success", None);
                    println!("Saved {}", path.display());
                }
                Err(err) => {
                    timer.complete("error", Some(err.to_string()));
                    println!("Error: {err}");
                }
            }
        }
        Command::Reset => {
            controller.reset();
            println!("Session reset. Back to Step 1: Face.");
        }
        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn parses_attribute_commands() {
        assert_eq!(
            parse_command("age 26-35"),
            Ok(Some(Command::Age(AgeRange::From26To35)))
        );
        assert_eq!(
            parse_command("ethnicity Middle Eastern"),
            Ok(Some(Command::Ethnicity(Ethnicity::MiddleEastern)))
        );
        assert_eq!(
            parse_command("STYLE with a pet"),
            Ok(Some(Command::Style(SceneStyle::WithAPet)))
        );
    }

    #[test]
    fn unknown_choice_reports_allowed_values() {
        let err = parse_command("style noir").unwrap_err();
        assert!(err.contains("Unknown style 'noir'"));
        assert!(err.contains("Emotional"));
        assert_eq!(parse_command("hair").unwrap_err(), "Usage: hair <value>");
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(parse_command("use 1"), Ok(Some(Command::Use(0))));
        assert_eq!(parse_command("pick-face 3"), Ok(Some(Command::PickFace(2))));
        assert!(parse_command("use 0").is_err());
        assert!(parse_command("pick-scene two").is_err());
    }

    #[test]
    fn free_text_keeps_inner_spacing() {
        assert_eq!(
            parse_command("scene  reading  a book in a cafe "),
            Ok(Some(Command::Scene("reading  a book in a cafe".to_string())))
        );
        assert_eq!(
            parse_command("describe"),
            Ok(Some(Command::Describe(String::new())))
        );
    }

    #[test]
    fn parses_save_targets() {
        assert_eq!(
            parse_command("save scene out/beach.png"),
            Ok(Some(Command::Save {
                target: SaveTarget::Scene,
                path: Some(PathBuf::from("out/beach.png")),
            }))
        );
        assert_eq!(
            parse_command("save face"),
            Ok(Some(Command::Save {
                target: SaveTarget::Face,
                path: None,
            }))
        );
        assert!(parse_command("save everything").is_err());
    }

    #[test]
    fn default_save_path_uses_mime_extension() {
        let image = ImageData::new("image/png", "AAAA");
        let path = default_save_path(Path::new("downloads"), SaveTarget::Scene, &image);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("lifestyle-scene-"));
        assert!(name.ends_with(".png"));
        assert!(path.starts_with("downloads"));
    }

    #[tokio::test]
    async fn save_image_writes_decoded_bytes() {
        let dir = std::env::temp_dir().join(format!("facecast-save-{}", std::process::id()));
        let path = dir.join("nested").join("face.jpeg");
        let image = ImageData::from_bytes("image/jpeg", b"jpeg-bytes");

        save_image(&image, &path).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg-bytes");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn command_names_match_keywords() {
        for line in ["faces", "scenes", "reset", "create", "face"] {
            let command = parse_command(line).unwrap().unwrap();
            assert_eq!(command.name(), line);
        }
    }
}
