use clap::Parser;
use slack_patrol::infrastructure::cooldown_file::DEFAULT_STATE_FILE;
use slack_patrol::infrastructure::logging::{self, LogOptions};
use slack_patrol::{
    persist_snapshot, AuditSink, ConsoleNotifier, CooldownFile, CooldownStore, Environment,
    FlushConfig, MessageEvent, MessageTemplates, Moderator, NoopAuditSink, Notifier,
    PersistenceWorker, Settings, SlackNotifier, WebhookAuditSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Reads message events as JSON lines on stdin and posts warnings.
#[derive(Parser, Debug)]
#[command(name = "slack-patrol", version)]
struct Args {
    /// Path to config.json
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to messages.json (warning texts)
    #[arg(long, default_value = "messages.json")]
    messages: PathBuf,

    /// Cooldown state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let env = Environment::from_env();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let log_options = LogOptions::resolve(&env, settings.logging.as_ref());
    let _guard = match logging::init(&log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("cannot open log file {}: {}", log_options.file.display(), e);
            std::process::exit(1);
        }
    };

    let engine = match settings.engine_builder().build() {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %e, "invalid engine configuration");
            std::process::exit(1);
        }
    };

    let state_file = Arc::new(CooldownFile::new(args.state_file.clone()));
    match state_file.load() {
        Ok(entries) => {
            let restored = engine.cooldowns().restore(entries);
            info!(
                entries = restored,
                path = %state_file.path().display(),
                "cooldown state restored"
            );
        }
        Err(e) => warn!(error = %e, "cooldown state unreadable; starting empty"),
    }

    install_panic_flush(&engine, &state_file);
    let flush = PersistenceWorker::spawn(
        Arc::clone(engine.cooldowns()),
        state_file.clone(),
        FlushConfig::default(),
    );

    let templates = match MessageTemplates::load(&args.messages) {
        Ok(templates) => templates,
        Err(e) => {
            warn!(error = %e, "using built-in warning texts");
            MessageTemplates::default()
        }
    };
    let notifier: Arc<dyn Notifier> = match env.slack_bot_token.clone() {
        Some(token) => Arc::new(SlackNotifier::new(token, templates)),
        None => {
            warn!("SLACK_BOT_TOKEN not set, warnings go to the console");
            Arc::new(ConsoleNotifier::new(templates))
        }
    };
    let audit: Arc<dyn AuditSink> = match env.sheets_webhook_url.clone() {
        Some(url) => Arc::new(WebhookAuditSink::new(url)),
        None => {
            warn!("SHEETS_WEBHOOK_URL not set, audit log disabled");
            Arc::new(NoopAuditSink)
        }
    };
    let moderator = Moderator::new(Arc::clone(&engine), notifier, audit);

    info!(
        mode = ?settings.mode,
        channels = settings.channels.len(),
        user_cooldown_sec = settings.cooldown_sec_user,
        channel_cooldown_sec = settings.cooldown_sec_channel,
        "slack-patrol started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweep.tick() => engine.sweep_windows(),
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                report_task(joined);
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<MessageEvent>(&line) {
                    Ok(event) => {
                        let moderator = moderator.clone();
                        tasks.spawn(async move {
                            moderator.handle(&event).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed event"),
                },
                Ok(None) => {
                    info!("input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "cannot read input");
                    break;
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report_task(joined);
    }

    let metrics = engine.metrics().snapshot();
    info!(
        evaluated = metrics.events_evaluated,
        admitted = metrics.warnings_admitted,
        denied = metrics.warnings_denied,
        "shutting down"
    );
    match flush.shutdown().await {
        Ok(entries) => debug!(entries, "final cooldown state saved"),
        Err(e) => error!(error = %e, "final cooldown save failed"),
    }
}

/// Log an event task that panicked or was cancelled. Returns whether it failed.
fn report_task(joined: Result<(), JoinError>) -> bool {
    match joined {
        Ok(()) => false,
        Err(e) => {
            error!(error = %e, panicked = e.is_panic(), "event task failed");
            true
        }
    }
}

/// Save cooldowns synchronously when a panic is about to unwind past its
/// caller. Panics inside rule evaluation are recovered by the engine and
/// skip the save.
fn install_panic_flush(engine: &Arc<slack_patrol::ModerationEngine>, file: &Arc<CooldownFile>) {
    let tracker = Arc::clone(engine.cooldowns());
    let file = Arc::clone(file);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        if slack_patrol::is_evaluating() {
            return;
        }
        if let Err(e) = persist_snapshot(&*tracker, &*file) {
            eprintln!("cooldown state not saved: {}", e);
        }
    }));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_task_is_reported() {
        let mut tasks: JoinSet<()> = JoinSet::new();
        tasks.spawn(async { panic!("notifier exploded") });
        tasks.spawn(async {});

        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            if report_task(joined) {
                failed += 1;
            }
        }
        assert_eq!(failed, 1);
    }
}
