use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(name = "curio", version, about = "Curio CLI: photograph something and talk with it from a terminal")]
struct Cli {
    /// API base URL
    #[arg(long, env = "CURIO_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Session id from `curio session create`
    #[arg(long, env = "CURIO_SESSION_ID")]
    session_id: Option<String>,

    /// Session token from `curio session create`
    #[arg(long, env = "CURIO_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Print the OpenAPI document
    Discover {
        /// Only list method, path and summary per endpoint
        #[arg(long)]
        endpoints: bool,
    },
    /// Session operations
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Upload a photo (JPEG, PNG or WebP)
    Upload {
        /// Path to the image file
        file: PathBuf,
        /// Override the content type guessed from the extension
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Upload a recorded question for a voice turn
    UploadAudio {
        /// Path to the audio clip
        file: PathBuf,
        /// Override the content type guessed from the extension
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Start analyzing an upload
    Analyze {
        /// Upload id returned by `curio upload`
        upload_id: String,
        /// Poll until ready or failed
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Show the current state of an analysis
    Analysis {
        /// Analysis id
        analysis_id: String,
    },
    /// Send one conversation turn
    Chat {
        /// Conversation id from a ready analysis
        conversation_id: String,
        /// Question text
        #[arg(long)]
        text: Option<String>,
        /// Reference from `curio upload-audio`
        #[arg(long)]
        audio_ref: Option<String>,
    },
    /// Download a synthesized reply
    Audio {
        /// Audio id (last segment of a reply audio stream URL)
        audio_id: String,
        /// Output file
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Create an anonymous session
    Create,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/').to_string();
    let raw = cli.raw;
    let session = || util::require_session(cli.session_id.clone(), cli.session_token.clone());

    let code = match cli.command {
        Commands::Health => commands::health::run(&api_url, raw).await,
        Commands::Discover { endpoints } => commands::discover::run(&api_url, endpoints, raw).await,
        Commands::Session { command } => match command {
            SessionCommands::Create => commands::session::create(&api_url, raw).await,
        },
        Commands::Upload { file, content_type } => {
            commands::upload::image(&api_url, &session(), &file, content_type.as_deref(), raw).await
        }
        Commands::UploadAudio { file, content_type } => {
            commands::upload::audio(&api_url, &session(), &file, content_type.as_deref(), raw).await
        }
        Commands::Analyze {
            upload_id,
            wait,
            timeout_secs,
            interval_ms,
        } => {
            commands::analysis::start(
                &api_url,
                &session(),
                &upload_id,
                wait.then(|| Duration::from_secs(timeout_secs)),
                Duration::from_millis(interval_ms),
                raw,
            )
            .await
        }
        Commands::Analysis { analysis_id } => {
            commands::analysis::get(&api_url, &session(), &analysis_id, raw).await
        }
        Commands::Chat {
            conversation_id,
            text,
            audio_ref,
        } => commands::chat::turn(&api_url, &session(), &conversation_id, text, audio_ref, raw).await,
        Commands::Audio { audio_id, output } => {
            commands::audio::download(&api_url, &audio_id, &output, raw).await
        }
    };

    std::process::exit(code);
}
