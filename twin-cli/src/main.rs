// Twin Command Line Interface
// Provision avatars, talk to them and preview lip sync

mod console;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use twin_core::{IdentityHandle, TwinConfig};
use twin_llm::{HttpReplyProvider, ReplyConfig, ReplyProvider};
use twin_me::{
    AvatarClientConfig, AvatarGenerator, ConversationPipeline, HttpAvatarGenerator,
    InMemoryModelHost, LipSyncPlayer, PlaybackState, ProvisioningOrchestrator, SimulatedAudio,
};
use twin_spk::{
    estimate_duration_ms, estimate_visemes, ApiVoiceEngine, AudioAsset, SpeechClip,
    VoiceClientConfig, VoiceEngine,
};

#[derive(Parser)]
#[command(name = "twin")]
#[command(about = "Talking avatar pipeline: provision, converse, preview", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an avatar identity from a photo and optional voice samples
    Provision {
        /// User the avatar belongs to
        #[arg(long)]
        user_id: String,

        /// Face photo (JPEG or PNG)
        #[arg(long)]
        photo: PathBuf,

        /// Voice sample to clone; repeat for several. Omit to use the default voice
        #[arg(long = "voice-sample")]
        voice_samples: Vec<PathBuf>,

        /// Write the identity JSON here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Also save the downloaded avatar mesh
        #[arg(long)]
        asset_out: Option<PathBuf>,
    },

    /// Talk to a provisioned avatar
    Converse {
        /// Identity file written by `provision`
        #[arg(long, short)]
        identity: PathBuf,

        /// Message to send; starts an interactive console when omitted
        message: Option<String>,

        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run estimated visemes for some text through the lip-sync engine offline
    Preview {
        /// Text to animate
        text: String,

        /// Print a frame every N milliseconds of playback
        #[arg(long, default_value = "80")]
        every_ms: u64,

        /// Pace output in real time
        #[arg(long)]
        realtime: bool,
    },

    /// Show or delete a generated avatar on the avatar service
    Avatar {
        avatar_id: String,

        /// Delete the avatar instead of showing its status
        #[arg(long)]
        delete: bool,
    },

    /// Show or delete the cloned voice registered for a user
    Voice {
        user_id: String,

        /// Delete the cloned voice instead of showing it
        #[arg(long)]
        delete: bool,
    },

    /// Check the avatar, voice and reply services
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref(), &config);

    match cli.command {
        Commands::Provision {
            user_id,
            photo,
            voice_samples,
            out,
            asset_out,
        } => {
            provision(&config, &user_id, &photo, &voice_samples, out, asset_out).await?;
        }
        Commands::Converse {
            identity,
            message,
            json,
        } => {
            converse(&config, &identity, message, json).await?;
        }
        Commands::Preview {
            text,
            every_ms,
            realtime,
        } => {
            preview(&config, &text, every_ms, realtime).await?;
        }
        Commands::Avatar { avatar_id, delete } => {
            manage_avatar(&config, &avatar_id, delete).await?;
        }
        Commands::Voice { user_id, delete } => {
            manage_voice(&config, &user_id, delete).await?;
        }
        Commands::Health => {
            check_health(&config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<TwinConfig> {
    let mut config = match path {
        Some(path) => TwinConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from '{}'", path))?,
        None => TwinConfig::default(),
    };
    config.apply_env_with(|key| std::env::var(key).ok());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn init_tracing(cli_level: Option<&str>, config: &TwinConfig) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn voice_engine(config: &TwinConfig) -> anyhow::Result<Arc<ApiVoiceEngine>> {
    let engine = ApiVoiceEngine::new(VoiceClientConfig::from_services(&config.services))
        .context("Failed to create voice client")?;
    Ok(Arc::new(engine))
}

fn read_file(path: &Path) -> anyhow::Result<Bytes> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

/// Create an avatar identity
async fn provision(
    config: &TwinConfig,
    user_id: &str,
    photo: &Path,
    voice_samples: &[PathBuf],
    out: Option<PathBuf>,
    asset_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let photo = read_file(photo)?;
    let samples = voice_samples
        .iter()
        .map(|p| read_file(p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let generator = HttpAvatarGenerator::new(AvatarClientConfig::from_services(&config.services))
        .context("Failed to create avatar client")?;
    let host = Arc::new(InMemoryModelHost::new());
    let orchestrator = ProvisioningOrchestrator::new(
        Arc::new(generator),
        host.clone(),
        voice_engine(config)?,
        config.services.timeouts.clone(),
        config.conversation.clone(),
    );

    let identity = orchestrator
        .provision(user_id, photo, samples)
        .await
        .context("Provisioning failed")?;

    if let Some(path) = asset_out {
        let asset = host
            .asset(identity.avatar_id())
            .ok_or_else(|| anyhow!("Avatar mesh was not loaded"))?;
        std::fs::write(&path, &asset.data)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✅ Mesh saved to {} ({} bytes)", path.display(), asset.len());
    }

    match out {
        Some(path) => {
            identity
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Provisioned {}", identity);
            println!("Identity saved to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&identity)?),
    }

    Ok(())
}

/// Build the conversation pipeline and start the player's tick loop.
fn start_pipeline(
    config: &TwinConfig,
) -> anyhow::Result<(Arc<ConversationPipeline>, JoinHandle<()>)> {
    let reply = HttpReplyProvider::new(ReplyConfig::from_services(
        &config.services,
        &config.conversation,
    ))
    .context("Failed to create reply client")?;

    let (player, handle) = LipSyncPlayer::new(Box::new(SimulatedAudio::new()), &config.animation);
    let ticker = tokio::spawn(player.run(config.animation.tick_interval()));

    let pipeline = ConversationPipeline::new(
        Arc::new(reply),
        voice_engine(config)?,
        handle,
        config.services.timeouts.clone(),
        config.conversation.message_type.clone(),
    );
    Ok((Arc::new(pipeline), ticker))
}

/// Talk to an avatar, once or interactively
async fn converse(
    config: &TwinConfig,
    identity_path: &Path,
    message: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let identity = IdentityHandle::load(identity_path)
        .with_context(|| format!("Failed to load identity from {}", identity_path.display()))?;
    info!("Loaded {}", identity);

    let (pipeline, ticker) = start_pipeline(config)?;

    match message {
        Some(message) => {
            let reply = pipeline
                .converse(&identity, &message)
                .await
                .context("Conversation turn failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                println!("{}", reply.text);
                if let Some(ref tone) = reply.emotional_tone {
                    debug!("Emotional tone: {}", tone);
                }
            }

            let limit = reply.duration + Duration::from_secs(5);
            tokio::time::timeout(limit, pipeline.player().wait_for_idle(reply.turn))
                .await
                .context("Playback did not finish")??;
        }
        None => {
            let mut console = console::ConversationConsole::new(pipeline.clone(), identity);
            console.run().await?;
        }
    }

    drop(pipeline);
    ticker.await?;
    Ok(())
}

/// Animate estimated visemes without any services
async fn preview(
    config: &TwinConfig,
    text: &str,
    every_ms: u64,
    realtime: bool,
) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        return Err(anyhow!("Nothing to preview"));
    }

    let events = estimate_visemes(text);
    let duration = Duration::from_millis(estimate_duration_ms(text));
    let clip = SpeechClip::new(AudioAsset::new("preview", Bytes::new()), events, duration);
    println!(
        "Previewing {} visemes over {:?} (rate {}, tick {:?})",
        clip.events.len(),
        duration,
        config.animation.smoothing_rate,
        config.animation.tick_interval()
    );

    let (mut player, handle) = LipSyncPlayer::new(Box::new(SimulatedAudio::new()), &config.animation);
    handle.play(clip, 1)?;

    let dt = config.animation.tick_interval();
    let every = Duration::from_millis(every_ms.max(1));
    let mut clock = Duration::ZERO;
    let mut next_print = Duration::ZERO;
    println!("{:>8}  {:>6}  {:>6}  {:>6}  viseme", "t", "jaw", "smile", "pucker");

    loop {
        let frame = player.tick(dt);
        clock += dt;

        if clock >= next_print || frame.state == PlaybackState::Idle {
            let status = handle.status();
            println!(
                "{:>6}ms  {:>6.3}  {:>6.3}  {:>6.3}  {}",
                clock.as_millis(),
                frame.pose.jaw_open,
                frame.pose.mouth_smile,
                frame.pose.mouth_pucker,
                status.viseme.as_deref().unwrap_or("-")
            );
            next_print += every;
        }

        if frame.state == PlaybackState::Idle {
            break;
        }
        if realtime {
            tokio::time::sleep(dt).await;
        }
    }

    println!("✅ Settled to neutral after {:?}", clock);
    Ok(())
}

/// Show or delete a remote avatar
async fn manage_avatar(config: &TwinConfig, avatar_id: &str, delete: bool) -> anyhow::Result<()> {
    let generator = HttpAvatarGenerator::new(AvatarClientConfig::from_services(&config.services))
        .context("Failed to create avatar client")?;

    if delete {
        generator
            .delete_avatar(avatar_id)
            .await
            .with_context(|| format!("Failed to delete avatar {}", avatar_id))?;
        println!("✅ Deleted avatar {}", avatar_id);
        return Ok(());
    }

    let status = generator
        .status(avatar_id)
        .await
        .with_context(|| format!("Failed to get status of avatar {}", avatar_id))?;
    println!(
        "{}: {} ({:.0}%)",
        status.avatar_id,
        status.status,
        status.progress * 100.0
    );
    if let Some(ref message) = status.message {
        println!("  {}", message);
    }
    Ok(())
}

/// Show or delete a user's cloned voice
async fn manage_voice(config: &TwinConfig, user_id: &str, delete: bool) -> anyhow::Result<()> {
    let engine = voice_engine(config)?;

    if delete {
        if engine
            .delete_user_voice(user_id)
            .await
            .with_context(|| format!("Failed to delete voice of {}", user_id))?
        {
            println!("✅ Deleted cloned voice of {}", user_id);
        } else {
            println!("{} has no cloned voice", user_id);
        }
        return Ok(());
    }

    match engine
        .user_voice(user_id)
        .await
        .with_context(|| format!("Failed to look up voice of {}", user_id))?
    {
        Some(voice_id) => println!("{}: {}", user_id, voice_id),
        None => println!("{} has no cloned voice (default voice is used)", user_id),
    }
    Ok(())
}

/// Check every collaborator service
async fn check_health(config: &TwinConfig) -> anyhow::Result<()> {
    let avatar = HttpAvatarGenerator::new(AvatarClientConfig::from_services(&config.services))?;
    let voice = voice_engine(config)?;
    let reply = HttpReplyProvider::new(ReplyConfig::from_services(
        &config.services,
        &config.conversation,
    ))?;

    let (avatar_result, voice_result, reply_result) =
        tokio::join!(avatar.health(), voice.health(), reply.health());

    let results = [
        ("avatar", config.services.avatar_url.as_str(), avatar_result.map_err(|e| e.to_string())),
        ("voice", config.services.voice_url.as_str(), voice_result.map_err(|e| e.to_string())),
        ("reply", config.services.reply_url.as_str(), reply_result.map_err(|e| e.to_string())),
    ];

    let mut failures = 0;
    for (name, url, result) in &results {
        match result {
            Ok(()) => println!("✅ {:<7} {}", name, url),
            Err(e) => {
                println!("❌ {:<7} {}: {}", name, url, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} services unhealthy", failures, results.len()));
    }
    Ok(())
}
