use std::io::{self, BufRead};
use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bingo_stats::config::{GAME_COMPLETED_EVENT, SyncConfig};
use bingo_stats::events::EventBus;
use bingo_stats::local_store::{FileStore, KeyValueStore};
use bingo_stats::reconcile::Reconciler;
use bingo_stats::state::{Delta, ProfileState, apply_delta, source_label, trigger_label};
use bingo_stats::stats_fetch::HttpStatsFetcher;
use bingo_stats::sync::{SyncSetup, spawn_stats_sync};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let cfg = SyncConfig::from_env();
    let user_id = parse_user_arg()
        .or_else(|| std::env::var("STATS_USER_ID").ok())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("no user id: pass --user <id> or set STATS_USER_ID"))?;

    let store = match cfg.store_path.clone() {
        Some(path) => FileStore::open(path),
        None => FileStore::open_default()?,
    };
    let fetcher = HttpStatsFetcher::new(&cfg).context("set up stats fetcher")?;
    tracing::info!(store = %store.path().display(), url = fetcher.url(), "starting stats sync");
    let store: Arc<dyn KeyValueStore> = Arc::new(store);
    let reconciler = Reconciler::new(Arc::new(fetcher), store.clone());
    let bus = Arc::new(EventBus::new());

    let (tx, rx) = mpsc::channel();
    let mut handle = spawn_stats_sync(
        &cfg,
        SyncSetup {
            user_id: user_id.clone(),
            reconciler,
            store,
            channel: None,
            broadcast: bus.clone(),
        },
        tx,
    )?;

    let discard_stale = cfg.discard_stale;
    let printer = thread::spawn(move || {
        let mut state = ProfileState::new(discard_stale);
        for delta in rx {
            apply_delta(&mut state, delta);
            for line in state.logs.drain(..) {
                eprintln!("{line}");
            }
            print_profile(&user_id, &state);
        }
    });

    println!("commands: done (game completed) | r (refresh) | q (quit)");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        match line.trim() {
            "done" | "d" => {
                bus.publish(GAME_COMPLETED_EVENT, &json!({ "source": "stdin" }));
            }
            "r" | "refresh" => {
                if !handle.refresh() {
                    eprintln!("[WARN] Refresh request failed");
                }
            }
            "q" | "quit" => break,
            "" => {}
            other => eprintln!("unknown command: {other}"),
        }
    }

    handle.stop();
    drop(handle);
    if printer.join().is_err() {
        return Err(anyhow!("printer thread panicked"));
    }
    Ok(())
}

fn print_profile(user_id: &str, state: &ProfileState) {
    let Some(stats) = state.stats.as_ref() else {
        return;
    };
    let achievement = state.achievement();
    let source = state.source.map(source_label).unwrap_or("-");
    let trigger = state.last_trigger.map(trigger_label).unwrap_or("-");
    let synced = state
        .synced_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let tier = match state.reported_tier_label.as_deref() {
        Some(reported) => format!("{} (server: {reported})", achievement.tier.label()),
        None => achievement.tier.label().to_string(),
    };
    println!(
        "{synced} {user_id} [{source}, {trigger}] played {} won {} lost {} drawn {} | lines {} (avg {:.1}) | win {}% | {tier}",
        stats.games_played,
        stats.games_won,
        stats.games_lost,
        stats.games_drawn,
        stats.total_lines_completed,
        stats.average_lines_per_game,
        stats.win_rate_label(),
    );
}

fn parse_user_arg() -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--user=")
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == "--user"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bingo_stats=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}
