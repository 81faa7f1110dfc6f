use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voicepal::llm::ChatCompletionClient;
use voicepal::speech::{
    AssemblyAiClient, AudioSettingsUpdate, PlaybackAdapter, SystemSpeaker, TextOnlySpeaker,
};
use voicepal::{
    Adapters, AppConfig, ModelId, Role, TurnController, TurnEvent, TurnHandle, VoicepalError,
};

/// Voicepal: talk with an AI friend.
#[derive(Parser)]
#[command(name = "voicepal", version, about)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to start with (glm-4 or deepseek-chat)
    #[arg(short, long)]
    model: Option<ModelId>,

    /// Don't speak the greeting on start
    #[arg(long)]
    no_greeting: bool,

    /// Print replies without speaking them
    #[arg(long)]
    text_only: bool,
}

const HELP: &str = "\
  <enter>          start / stop recording
  s                stop speaking
  m [model]        list models or switch (resets the conversation)
  r                reset the conversation
  rate|pitch|volume <n>, voice <tag>
  test             test the connection to the current model
  q                quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicepal=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = run(Cli::parse()).await;
    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<VoicepalError>() {
            eprintln!("{}", err.user_message());
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?.with_env();
    if let Some(model) = cli.model {
        config.turn.default_model = model;
    }
    if cli.no_greeting {
        config.turn.greet_on_start = false;
    }
    config.validate()?;

    info!("Starting Voicepal with {}", config.turn.default_model.display_name());

    let completer = Arc::new(ChatCompletionClient::new(config.completion.clone())?);
    let adapters = Adapters {
        capture: microphone()?,
        transcriber: Arc::new(AssemblyAiClient::new(config.transcription.clone())?),
        completer: completer.clone(),
        playback: speaker(cli.text_only),
    };

    let (controller, handle) = TurnController::new(config.turn.clone(), adapters);
    let controller = controller.with_audio_settings(config.audio.clone()).start();
    let printer = spawn_event_printer(&handle);

    println!("Voicepal v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", HELP);
    if config.turn.greet_on_start {
        handle.greet().await?;
    }

    run_prompt(&handle, &completer).await?;

    handle.shutdown().await.ok();
    controller.await.context("turn controller panicked")?;
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }
    Ok(())
}

#[cfg(feature = "audio-io")]
fn microphone() -> Result<Arc<dyn voicepal::audio::CaptureAdapter>> {
    Ok(Arc::new(voicepal::audio::MicrophoneCapture::new()))
}

#[cfg(not(feature = "audio-io"))]
fn microphone() -> Result<Arc<dyn voicepal::audio::CaptureAdapter>> {
    anyhow::bail!("voicepal was built without the audio-io feature")
}

fn speaker(text_only: bool) -> Arc<dyn PlaybackAdapter> {
    if text_only {
        return Arc::new(TextOnlySpeaker);
    }
    match SystemSpeaker::detect() {
        Some(speaker) => Arc::new(speaker),
        None => {
            warn!("No speech synthesizer found, replies will be text only");
            Arc::new(TextOnlySpeaker)
        }
    }
}

fn spawn_event_printer(handle: &TurnHandle) -> std::thread::JoinHandle<()> {
    let events = handle.event_receiver();
    std::thread::spawn(move || {
        for event in events.iter() {
            match event {
                TurnEvent::MessageAppended(message) => {
                    let who = match message.role() {
                        Role::User => "you",
                        Role::Assistant => "pal",
                    };
                    println!("{:>4}: {}", who, message.content());
                }
                TurnEvent::StateChanged { to, .. } => println!("      [{}]", to),
                TurnEvent::ModelSwitched(model) => {
                    println!("      now talking to {}", model.display_name())
                }
                TurnEvent::Rejected { operation, state } => {
                    println!("      can't {} while {}", operation, state)
                }
                TurnEvent::PlaybackFailed(error) => println!("      (speech failed: {})", error),
                TurnEvent::ConversationReset { .. } => {}
                TurnEvent::Shutdown => break,
            }
        }
    })
}

async fn run_prompt(handle: &TurnHandle, completer: &ChatCompletionClient) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        let outcome = match (command, argument) {
            ("", _) => handle.toggle_turn().await,
            ("s" | "stop", _) => handle.interrupt_speaking().await,
            ("r" | "reset", _) => handle.reset().await,
            ("m" | "model", None) => {
                let current = handle.conversation().model();
                for model in ModelId::ALL {
                    let marker = if model == current { "*" } else { " " };
                    println!(
                        "  {} {:<14} {}",
                        marker,
                        model.api_name(),
                        model.description()
                    );
                }
                Ok(())
            }
            ("m" | "model", Some(name)) => match name.parse::<ModelId>() {
                Ok(model) => handle.switch_model(model).await,
                Err(e) => Err(e),
            },
            ("rate" | "pitch" | "volume", Some(value)) => match value.parse::<f32>() {
                Ok(value) => {
                    let update = match command {
                        "rate" => AudioSettingsUpdate::rate(value),
                        "pitch" => AudioSettingsUpdate::pitch(value),
                        _ => AudioSettingsUpdate::volume(value),
                    };
                    handle.update_audio_settings(update).await
                }
                Err(_) => {
                    println!("not a number: {}", value);
                    Ok(())
                }
            },
            ("voice", Some(tag)) => {
                handle
                    .update_audio_settings(AudioSettingsUpdate::voice(tag))
                    .await
            }
            ("test", _) => {
                let model = handle.conversation().model();
                println!("{}", completer.check_connection(model).await);
                Ok(())
            }
            ("q" | "quit" | "exit", _) => break,
            _ => {
                println!("{}", HELP);
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {}
            Err(VoicepalError::ConfigError(detail)) => println!("{}", detail),
            Err(e) if e.is_recoverable() => println!("{}", e.user_message()),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
