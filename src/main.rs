use anyhow::{Context, Result};
use rand::Rng;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use story_viewer::demo::{random_sequence, LoggingEffects, SimulatedSurface};
use story_viewer::remote::{
    fetch_sequence, load_playlist, parse_base_url, HttpEffects, RemoteSurface,
};
use story_viewer::{
    event_channel, Command, EffectsBackend, EngineEvent, EventReceiver, IntervalTicker, ItemId,
    MediaItem, MediaSurface, Player, PlayerHandle, Sequence, Settings,
};
use std::io::BufRead;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "STORY_VIEWER_CONFIG";
const DEFAULT_DEMO_ITEMS: usize = 8;

enum Source {
    Remote(Vec<MediaItem>),
    Demo(usize),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("Failed to load settings")?;

    let client = Client::new();
    let base = parse_base_url(&settings.api_url)?;

    let source = if let Some(path) = &settings.playlist {
        Source::Remote(load_playlist(path).await?)
    } else if let Some(count) = settings.demo_items {
        Source::Demo(count)
    } else {
        match fetch_sequence(&client, &base, settings.token.as_deref()).await {
            Ok(items) => Source::Remote(items),
            Err(e) => {
                tracing::warn!("Failed to fetch stories, falling back to demo: {:#}", e);
                Source::Demo(DEFAULT_DEMO_ITEMS)
            }
        }
    };

    let (items, surface, effects): (Vec<MediaItem>, Arc<dyn MediaSurface>, Arc<dyn EffectsBackend>) =
        match source {
            Source::Remote(items) => (
                items,
                Arc::new(RemoteSurface::new(
                    client.clone(),
                    base.clone(),
                    settings.token.clone(),
                )),
                Arc::new(HttpEffects::new(client, base, settings.token.clone())),
            ),
            Source::Demo(count) => {
                let mut rng = rand::thread_rng();
                let count = count.max(1);
                tracing::info!("Running offline demo with {} items", count);
                let failure_rate = rng.gen_range(0.0..0.2);
                (
                    random_sequence(&mut rng, count),
                    Arc::new(SimulatedSurface::new()),
                    Arc::new(LoggingEffects::new(failure_rate)),
                )
            }
        };

    let sequence = Sequence::new(items)?;
    let (events_tx, events_rx) = event_channel();
    let ticker = IntervalTicker::new(settings.engine.tick_interval());
    let (player, handle) = Player::open(
        sequence.clone(),
        settings.start_index,
        settings.engine.clone(),
        surface,
        effects,
        ticker,
        events_tx,
    )?;

    let first = sequence.get(settings.start_index).map(|i| i.id.clone());
    let (active_tx, active_rx) = watch::channel(first);
    tokio::spawn(log_events(events_rx, sequence, active_tx));
    tokio::spawn(read_commands(handle.clone(), active_rx));

    let mut run = tokio::spawn(player.run());
    let joined = tokio::select! {
        joined = &mut run => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            handle.close().await;
            run.await
        }
    };
    let reason = joined.context("Player task panicked")?;
    tracing::info!("Session ended: {:?}", reason);

    Ok(())
}

async fn log_events(
    mut events: EventReceiver,
    sequence: Sequence,
    active: watch::Sender<Option<ItemId>>,
) {
    let mut last_decile = None;
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ActiveIndexChanged(index) => {
                let item = sequence.get(index);
                if let Some(item) = item {
                    tracing::info!(
                        "[{}/{}] {} ({})",
                        index + 1,
                        sequence.len(),
                        item.id,
                        item.kind.as_str()
                    );
                }
                let _ = active.send(item.map(|i| i.id.clone()));
                last_decile = None;
            }
            EngineEvent::ProgressChanged { index, fraction } => {
                let decile = (fraction * 10.0) as u32;
                if last_decile != Some(decile) {
                    tracing::debug!("Item {} at {:.0}%", index, fraction * 100.0);
                    last_decile = Some(decile);
                }
            }
            EngineEvent::SequenceExhausted => tracing::info!("End of stories"),
            EngineEvent::InteractionStateChanged { item, state } => {
                tracing::info!(
                    "{}: liked={} saved={} draft={:?}",
                    item,
                    state.liked,
                    state.saved,
                    state.pending_reply_text
                );
            }
            EngineEvent::Error { kind, item } => match item {
                Some(item) => tracing::warn!("{} on {}", kind.as_str(), item),
                None => tracing::warn!("{}", kind.as_str()),
            },
        }
    }
}

/// Forward stdin lines from a plain thread; a blocking read on the runtime's
/// pool would keep it from shutting down.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    return;
                }
            }
        }
    });
    rx
}

async fn read_commands(handle: PlayerHandle, active: watch::Receiver<Option<ItemId>>) {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        let current = active.borrow().clone();
        let Some(command) = parse_command(line, current) else {
            if !line.is_empty() {
                tracing::warn!("Unknown command: {}", line);
            }
            continue;
        };
        let quit = command == Command::Close;
        if !handle.send(command).await || quit {
            return;
        }
    }

    handle.close().await;
}

fn parse_command(line: &str, current: Option<ItemId>) -> Option<Command> {
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match word {
        "n" | "next" => Command::Next,
        "p" | "prev" => Command::Previous,
        "j" | "jump" => Command::JumpTo(rest.parse().ok()?),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "mute" => Command::ToggleMute,
        "vol" => match rest {
            "+" => Command::VolumeUp,
            "-" => Command::VolumeDown,
            value => Command::SetVolume(value.parse().ok()?),
        },
        "like" => Command::ToggleLike(current?),
        "save" => Command::ToggleSave(current?),
        "share" => Command::Share(current?),
        "reply" => Command::OpenComposer(current?),
        "type" => Command::EditReply(current?, rest.to_string()),
        "send" if rest.is_empty() => Command::SubmitReply(current?, None),
        "send" => Command::SubmitReply(current?, Some(rest.to_string())),
        "cancel" => Command::CloseComposer,
        "q" | "quit" => Command::Close,
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        let item = Some(ItemId::from("a"));
        assert_eq!(parse_command("n", None), Some(Command::Next));
        assert_eq!(parse_command("j 3", None), Some(Command::JumpTo(3)));
        assert_eq!(parse_command("j x", None), None);
        assert_eq!(parse_command("vol 0.4", None), Some(Command::SetVolume(0.4)));
        assert_eq!(parse_command("vol +", None), Some(Command::VolumeUp));
        assert_eq!(
            parse_command("like", item.clone()),
            Some(Command::ToggleLike(ItemId::from("a")))
        );
        assert_eq!(parse_command("like", None), None);
        assert_eq!(
            parse_command("send hello there", item.clone()),
            Some(Command::SubmitReply(
                ItemId::from("a"),
                Some("hello there".into())
            ))
        );
        assert_eq!(
            parse_command("send", item),
            Some(Command::SubmitReply(ItemId::from("a"), None))
        );
        assert_eq!(parse_command("dance", None), None);
    }
}
