use std::io::Write as _;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

mod attributes;
mod config;
mod errors;
mod handlers;
mod llm;
mod prompts;
mod state;
mod utils;
mod workflow;

use config::Config;
use handlers::commands::{handle_command, parse_command, Command};
use handlers::render::help_text;
use llm::gateway::ModelSet;
use llm::{GeminiClient, GenerativeBackend};
use utils::logging::init_logging;
use workflow::WorkflowController;

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let (logs_dir, log_level) = config::log_settings();
    let _guards = init_logging(&logs_dir, &log_level);
    let config = Config::load().inspect_err(|err| error!("Failed to load config: {err}"))?;

    let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::new(&config)?);
    let controller = Arc::new(WorkflowController::new(backend, ModelSet::from(&config)));
    info!(
        "Starting facecast (face={}, scene={}, text={})",
        config.gemini_face_model, config.gemini_scene_model, config.gemini_text_model
    );

    println!("facecast: create a face, then place it in lifestyle scenes.");
    println!("{}", help_text());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                info!("Command received: {}", command.name());
                handle_command(controller.clone(), &config, command).await;
            }
            Ok(None) => {}
            Err(message) => {
                info!("Rejected input {:?}: {}", line, message);
                println!("{message}");
            }
        }
        prompt();
    }

    info!("Shutting down facecast");
    Ok(())
}
