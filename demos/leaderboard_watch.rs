//! Connects a public-role session to a live feed and prints snapshot
//! changes. Usage: `FEED_URL=ws://host:port/realtime cargo run --example
//! leaderboard_watch`.

use std::time::Duration;

use steps_ws::core::{ClientConfig, SessionIdentity};
use steps_ws::session::{RealtimeSession, SessionRole};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "steps_ws=info".into()),
        )
        .init();

    let url = std::env::var("FEED_URL").unwrap_or_else(|_| "ws://localhost:9000/ws".to_string());
    let identity = SessionIdentity::new("public-display");

    let session = match RealtimeSession::activate(
        url,
        identity,
        SessionRole::Public,
        ClientConfig::default(),
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            eprintln!("activation failed: {err}");
            return;
        }
    };

    let mut snapshot_rx = session.watch_snapshot();
    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshot_rx.borrow().clone();
                println!(
                    "state={:?} total={:?} leaderboard_len={}",
                    snapshot.connection_state,
                    snapshot.total_steps,
                    snapshot.leaderboard.len()
                );
                for entry in &snapshot.leaderboard {
                    println!(
                        "  #{} {} steps={} score={}",
                        entry.rank,
                        entry.naam.as_deref().unwrap_or(&entry.participant_id),
                        entry.steps,
                        entry.total_score
                    );
                }
            }
        }
    }

    if let Err(err) = session.shutdown().await {
        eprintln!("shutdown error: {err}");
    }
}
