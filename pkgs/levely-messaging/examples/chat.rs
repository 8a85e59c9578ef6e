use clap::Parser;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use levely_messaging::{
    badge_label, ChannelEvent, ConversationDirectory, DirectoryEvent, MediaFile, MessageChannel,
    MessageNotifier, MessagingConfig, NotificationBus, NotificationCenter, Overlay, OverlayEvent,
    ToastKind, TracingNotifier,
};
use levely_store::{LevelyStore, PersistenceConfig, Profile};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Levely terminal chat - talk to other users sharing the same database
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database shared by every participant
    #[arg(short, long, default_value = "levely.db")]
    database: PathBuf,

    /// Directory for uploaded images
    #[arg(short, long, default_value = "levely-storage")]
    storage: PathBuf,

    /// Your user id
    #[arg(short, long)]
    user: String,

    /// Display name stored in your profile
    #[arg(short, long)]
    name: Option<String>,

    /// Optional JSON file overriding messaging settings
    #[arg(long)]
    config: Option<PathBuf>,
}

fn show_help() {
    println!("\n📖 Commands:");
    println!("  list, l                  List conversations");
    println!("  open <user>              Open (or start) a conversation");
    println!("  send <text>, s <text>    Send to the open conversation");
    println!("  type <text>              Update the draft (sends a typing signal)");
    println!("  image <path>             Send an image");
    println!("  delete <message-id>      Delete one of your messages");
    println!("  history, h               Show the open conversation");
    println!("  xp <amount> <reason>     Publish an XP notification");
    println!("  close                    Close the open conversation");
    println!("  quit, q                  Exit");
}

struct Session {
    store: LevelyStore,
    config: Arc<MessagingConfig>,
    user: String,
    directory: ConversationDirectory,
    bus: NotificationBus,
    notifier: MessageNotifier,
    channel: Option<MessageChannel>,
    channel_events: tokio::sync::mpsc::UnboundedSender<ChannelEvent>,
}

/// Forward one channel's events into the main loop until the channel goes away.
fn forward_events(
    mut events: UnboundedReceiver<ChannelEvent>,
    sink: tokio::sync::mpsc::UnboundedSender<ChannelEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if sink.send(event).is_err() {
                break;
            }
        }
    });
}

impl Session {
    async fn print_directory(&self) {
        let entries = self.directory.conversations();
        if entries.is_empty() {
            println!("No conversations yet");
        }
        for entry in entries {
            let preview = entry
                .last_message
                .as_ref()
                .and_then(|m| m.preview())
                .unwrap_or("");
            let badge = badge_label(entry.unread_count)
                .map(|b| format!(" [{}]", b))
                .unwrap_or_default();
            println!(
                "  {} (lvl {}){}: {}",
                entry.counterpart.username, entry.counterpart.level, badge, preview
            );
        }
        if let Ok(total) = self.directory.total_unread().await {
            if let Some(badge) = badge_label(total) {
                println!("📬 Unread: {}", badge);
            }
        }
    }

    fn print_history(&self) {
        let Some(channel) = &self.channel else {
            println!("No conversation open");
            return;
        };
        for message in channel.messages() {
            let who = if message.sender_id == self.user {
                "you"
            } else {
                channel
                    .counterpart()
                    .map(|p| p.username.as_str())
                    .unwrap_or(message.sender_id.as_str())
            };
            let read = if message.is_read { "✓✓" } else { "✓" };
            println!(
                "  [{}] {} {}: {} {}",
                message.created_at.format("%H:%M"),
                &message.id[..8.min(message.id.len())],
                who,
                message.preview().unwrap_or(""),
                read
            );
        }
    }

    async fn open(&mut self, other: &str) -> anyhow::Result<()> {
        self.close().await;
        let conversation = self.directory.start_conversation(other).await?;
        let (channel, events) = self.directory.select(&conversation.id).await?;
        forward_events(events, self.channel_events.clone());
        self.notifier.set_viewing_messages(true);
        self.channel = Some(channel);
        self.print_history();
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        self.notifier.set_viewing_messages(false);
    }

    async fn process_command(&mut self, input: &str) -> anyhow::Result<bool> {
        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();

        match command {
            "help" | "?" => show_help(),
            "list" | "l" => self.print_directory().await,
            "open" | "o" => self.open(rest).await?,
            "history" | "h" => self.print_history(),
            "close" => self.close().await,
            "send" | "s" | "type" | "image" | "delete" => {
                let Some(channel) = &self.channel else {
                    println!("Open a conversation first");
                    return Ok(true);
                };
                match command {
                    "type" => {
                        channel.update_draft(rest);
                    }
                    "image" => {
                        let bytes = tokio::fs::read(rest).await?;
                        let file_name = PathBuf::from(rest)
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| rest.to_string());
                        channel.attach_image(MediaFile::new(file_name, bytes)).await?;
                    }
                    "delete" => {
                        let target = channel
                            .messages()
                            .into_iter()
                            .find(|m| m.id.starts_with(rest))
                            .map(|m| m.id);
                        match target {
                            Some(id) => channel.delete_message(&id, |_| true).await?,
                            None => println!("No message starting with {}", rest),
                        }
                    }
                    _ => {
                        channel.send(rest).await?;
                    }
                }
            }
            "xp" => {
                let (amount, reason) = rest.split_once(' ').unwrap_or((rest, "manual"));
                self.bus.publish_xp(amount.parse()?, reason)?;
            }
            "quit" | "exit" | "q" => return Ok(false),
            other => println!("Unknown command: {} (try 'help')", other),
        }
        Ok(true)
    }
}

fn print_toast(event: OverlayEvent) {
    let OverlayEvent::Shown(toast) = event else {
        return;
    };
    match toast.kind {
        ToastKind::Xp { amount, reason } => println!("⭐ +{} XP - {}", amount, reason),
        ToastKind::Achievement {
            title,
            description,
            icon,
            xp_reward,
        } => println!("{} {} - {} (+{} XP)", icon, title, description, xp_reward),
        ToastKind::Message {
            sender_name,
            preview,
            ..
        } => println!("💬 {}: {}", sender_name, preview),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("levely=info".parse()?))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
        None => MessagingConfig::default(),
    };
    let config = Arc::new(config);

    let store = LevelyStore::open(PersistenceConfig {
        db_path: args.database.clone(),
        storage_root: args.storage.clone(),
        ..Default::default()
    })
    .await?;

    let existing = store.profiles().get(&args.user).await?;
    if existing.is_none() || args.name.is_some() {
        store
            .profiles()
            .upsert(&Profile {
                id: args.user.clone(),
                username: args.name.clone().unwrap_or_else(|| args.user.clone()),
                avatar_url: None,
                level: existing.map(|p| p.level).unwrap_or(1),
            })
            .await?;
    }

    let overlay = Overlay::new(config.clone());
    let mut overlay_events = overlay.subscribe();
    let bus = NotificationBus::default();
    let _center = NotificationCenter::mount(&bus, overlay.clone());
    let notifier = MessageNotifier::start(
        store.clone(),
        config.clone(),
        Arc::new(TracingNotifier::new(true)),
        overlay,
        &args.user,
    )
    .await;

    let (directory, mut directory_events) =
        ConversationDirectory::open(store.clone(), config.clone(), &args.user).await;

    let (channel_sender, mut channel_events) = tokio::sync::mpsc::unbounded_channel();
    let mut session = Session {
        store,
        config,
        user: args.user.clone(),
        directory,
        bus,
        notifier,
        channel: None,
        channel_events: channel_sender,
    };

    println!("👋 Signed in as {}", args.user);
    show_help();
    session.print_directory().await;

    let (stdin_sender, mut stdin_receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && stdin_sender.send(line).is_err() {
                break;
            }
        }
    });

    info!("Starting main event loop");
    loop {
        print!("> ");
        io::stdout().flush()?;

        tokio::select! {
            Some(event) = channel_events.recv() => match event {
                ChannelEvent::MessageAppended(message) => {
                    println!("\n{}: {}", message.sender_id, message.preview().unwrap_or(""));
                }
                ChannelEvent::MessageRemoved { id } => println!("\n🗑️  {} was deleted", id),
                ChannelEvent::Typing { user_id } => println!("\n✏️  {} is typing...", user_id),
                ChannelEvent::FeedClosed => println!("\n⚠️  Live updates stopped"),
                other => debug!("Channel event: {:?}", other),
            },
            Some(event) = directory_events.next() => {
                if let DirectoryEvent::RefreshFailed(reason) = event {
                    println!("\n⚠️  Could not refresh conversations: {}", reason);
                }
            }
            Some(event) = overlay_events.next() => print_toast(event),
            Some(input) = stdin_receiver.recv() => {
                match session.process_command(&input).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("❌ {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close().await;
    session.directory.close().await;
    info!(
        "Goodbye {} ({} conversations, typing window {}ms)",
        session.user,
        session.store.conversations().list_for_user(&session.user).await?.len(),
        session.config.typing_window_ms
    );
    Ok(())
}
