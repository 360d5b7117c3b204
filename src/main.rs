use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::sync::{Notify, watch};
use tracing::{info, warn};

use jarvis_core::config::AssistantConfig;
use jarvis_core::core::session::{AppState, Assistant, Author, Message, SessionOrchestrator};
use jarvis_core::core::tools::{
    Navigator, RecordingNavigator, SystemNavigator, ToolDispatcher, function_declarations,
};
use jarvis_core::core::{GeminiLive, WavDevices};

/// How long the session must stay quiet after the input ended before it is closed
const SETTLE_TIME: Duration = Duration::from_secs(3);

/// JARVIS - voice-controlled browser assistant
#[derive(Parser, Debug)]
#[command(name = "jarvis")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one voice session, using a WAV file as the microphone
    Run {
        /// 16-bit WAV file replayed as microphone input
        #[arg(short = 'i', long = "input", value_name = "WAV")]
        input: PathBuf,

        /// Write the spoken replies to this WAV file
        #[arg(short = 'o', long = "output", value_name = "WAV")]
        output: Option<PathBuf>,

        /// Record browser actions instead of opening them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the function catalog advertised to the model
    Tools,

    /// Run one tool call locally
    Dispatch {
        /// Tool name, e.g. searchYouTube
        tool: String,

        /// Arguments as a JSON object, e.g. '{"query": "lofi beats"}'
        args: String,

        /// Record browser actions instead of opening them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        AssistantConfig::from_file(&config_path)?
    } else {
        AssistantConfig::from_env()?
    };

    match cli.command {
        Commands::Run {
            input,
            output,
            dry_run,
        } => run_session(config, input, output, dry_run).await,
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&function_declarations())?);
            Ok(())
        }
        Commands::Dispatch {
            tool,
            args,
            dry_run,
        } => dispatch(&tool, &args, dry_run).await,
    }
}

fn navigator(dry_run: bool) -> (Arc<dyn Navigator>, Option<RecordingNavigator>) {
    if dry_run {
        let recorder = RecordingNavigator::new();
        (Arc::new(recorder.clone()), Some(recorder))
    } else {
        (Arc::new(SystemNavigator), None)
    }
}

async fn dispatch(tool: &str, args: &str, dry_run: bool) -> anyhow::Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args).map_err(|e| anyhow!("Arguments are not valid JSON: {}", e))?;
    let (navigator, recorder) = navigator(dry_run);

    let result = ToolDispatcher::new(navigator).execute(tool, &args).await;
    println!("{}", result.to_json());

    if let Some(recorder) = recorder {
        for target in recorder.targets() {
            println!("would open {} ({})", target.url, target.disposition);
        }
    }
    Ok(())
}

async fn run_session(
    config: AssistantConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    config.require_api_key()?;

    let (navigator, recorder) = navigator(dry_run);
    let devices = WavDevices::new(input, output, config.input_sample_rate);
    let orchestrator = SessionOrchestrator::from_config(
        &config,
        Arc::new(GeminiLive::new()),
        Arc::new(devices),
        navigator,
    );
    let assistant = Assistant::new(orchestrator, config.tool_log_capacity);

    let (state_tx, mut state_rx) = watch::channel(AppState::Idle);
    assistant.on_state_change(Arc::new(move |state| {
        let _ = state_tx.send(state);
        Box::pin(async {})
    }));
    assistant.on_turn_complete(Arc::new(|messages| {
        Box::pin(async move {
            for message in &messages {
                print_message(message);
            }
        })
    }));
    assistant.on_tool_call(Arc::new(|call| {
        Box::pin(async move {
            println!("  [tool] {} {}", call.name, call.args);
        })
    }));
    let capture_ended = Arc::new(Notify::new());
    let notify = capture_ended.clone();
    assistant.on_capture_ended(Arc::new(move || {
        notify.notify_one();
        Box::pin(async {})
    }));

    if let Err(e) = assistant.activate().await {
        for message in assistant.messages() {
            print_message(&message);
        }
        return Err(e.into());
    }
    println!("Session started, streaming input (Ctrl-C to stop)");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
        _ = wait_until_settled(&capture_ended, &mut state_rx) => {}
    }

    // Deactivation clears the logs, so take them first
    let messages = assistant.messages();
    let tool_log = assistant.tool_log();
    assistant.deactivate().await;

    println!("\nConversation:");
    for message in &messages {
        print_message(message);
    }
    if !tool_log.is_empty() {
        println!("\nRecent tool calls:");
        for entry in &tool_log {
            println!("  {}", entry);
        }
    }
    if let Some(recorder) = recorder {
        for target in recorder.targets() {
            println!("would open {} ({})", target.url, target.disposition);
        }
    }
    Ok(())
}

/// Resolve once the input is exhausted and the session has been quiet for
/// [`SETTLE_TIME`], or as soon as the session ends.
async fn wait_until_settled(capture_ended: &Notify, states: &mut watch::Receiver<AppState>) {
    tokio::select! {
        _ = capture_ended.notified() => {}
        _ = states.wait_for(|s| *s == AppState::Idle) => return,
    }
    info!("Input finished, waiting for the reply");

    loop {
        let state = *states.borrow_and_update();
        if state == AppState::Idle {
            return;
        }
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    warn!("State updates stopped");
                    return;
                }
            }
            _ = tokio::time::sleep(SETTLE_TIME), if state == AppState::Listening => return,
        }
    }
}

fn print_message(message: &Message) {
    let speaker = match message.author {
        Author::User => "you",
        Author::Assistant => "jarvis",
    };
    println!("{:>7}: {}", speaker, message.text);
}
