use std::sync::Arc;

use matchfeed_rs::audio::ClipPlayer;
use matchfeed_rs::stream::transport_for;
use matchfeed_rs::{CommentaryStream, LastScore, MatchClient, MatchId, StreamConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchfeed_rs=info")),
        )
        .init();

    // Match to follow, e.g. `cargo run --example live_commentary -- 65f1c0`
    let match_id = std::env::args()
        .nth(1)
        .map(MatchId::from)
        .ok_or("usage: live_commentary <match-id>")?;

    let config = StreamConfig::from_env()?;
    let client = MatchClient::from_config(&config)?;
    let transport = transport_for(&config);

    #[cfg(feature = "rodio")]
    let player: Arc<dyn ClipPlayer> = Arc::new(matchfeed_rs::audio::RodioPlayer::new());
    #[cfg(not(feature = "rodio"))]
    let player: Arc<dyn ClipPlayer> = Arc::new(matchfeed_rs::audio::SilentPlayer);

    let mut stream =
        CommentaryStream::new(config, transport, player)?.with_refresher(Arc::new(client));
    let mut updates = stream.subscribe();

    println!("Connecting to match {}...", match_id);
    stream.watch_match(Some(match_id)).await?;

    let mut last_seen = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();

                println!("[{}] connected={} attempts={}/{}",
                    snapshot.connection_state,
                    snapshot.connected,
                    snapshot.reconnect.attempts,
                    snapshot.reconnect.max_attempts,
                );
                if let Some(error) = &snapshot.last_error {
                    println!("  ⚠️  {}", error);
                    if snapshot.reconnect.exhausted {
                        println!("  Retrying manually...");
                        stream.reconnect()?;
                    }
                }
                if let Some(score) = snapshot.last_score.as_ref().and_then(LastScore::score) {
                    println!("  Score: {}/{} ({:.1} ov)", score.runs, score.wickets, score.overs);
                }
                if let Some(latest) = &snapshot.latest {
                    if last_seen.as_ref() != latest.id.as_ref() {
                        println!("  🎙️  [{}] {}", latest.event_type.as_str(), latest.text);
                        last_seen = latest.id.clone();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    stream.disconnect().await;
    Ok(())
}
