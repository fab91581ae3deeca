mod args;
mod resolver;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use linkxfer_task::{Account, TaskEvent, TransferTask};
use linkxfer_transfer::{HttpTransport, TransferConfig, TransferWorker};

use args::{Args, Command};
use resolver::FixedLinkResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref());
    let transport = Arc::new(HttpTransport::new(&config)?);
    let worker = TransferWorker::spawn(config, transport)?;

    let account = Account {
        server_url: args.server,
        username: args.user,
        token: String::new(),
    };

    let mut task = match args.command {
        Command::Download {
            link,
            local_path,
            repo,
            path,
            file_id,
        } => {
            let path = if path.is_empty() {
                local_path
                    .file_name()
                    .map(|n| format!("/{}", n.to_string_lossy()))
                    .unwrap_or_default()
            } else {
                path
            };
            TransferTask::download(
                account,
                repo,
                path,
                local_path,
                Arc::new(FixedLinkResolver::download(link, file_id)),
                worker.handle(),
            )
        }
        Command::Upload {
            link,
            local_path,
            repo,
            parent_dir,
        } => TransferTask::upload(
            account,
            repo,
            parent_dir.clone(),
            local_path,
            Arc::new(FixedLinkResolver::upload(link, parent_dir)),
            worker.handle(),
        ),
    };

    let mut events = task
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("task events already taken"))?;
    task.start()?;

    let success = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TaskEvent::Progress { transferred, total }) => print_progress(transferred, total),
                Some(TaskEvent::Finished { success }) => break success,
                None => break false,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling transfer");
                task.cancel();
            }
        }
    };
    eprintln!();

    tokio::task::spawn_blocking(move || worker.shutdown()).await?;

    if success {
        println!("{} {}", task.direction(), task.local_file_path().display());
        if let Some(file_id) = task.file_id().filter(|id| !id.is_empty()) {
            println!("file id {file_id}");
        }
        if let Some(response) = task.server_response().filter(|r| !r.is_empty()) {
            println!("server response {response}");
        }
        Ok(())
    } else {
        match task.failure() {
            Some(e) if e.is_cancelled() => Err(anyhow::anyhow!("{} cancelled", task.direction())),
            Some(e) => Err(anyhow::anyhow!("{} failed: {e}", task.direction())),
            None => Err(anyhow::anyhow!("{} failed", task.direction())),
        }
    }
}

fn load_config(path: Option<&Path>) -> TransferConfig {
    let Some(path) = path else {
        return TransferConfig::default();
    };
    TransferConfig::load(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        TransferConfig::default()
    })
}

fn print_progress(transferred: u64, total: u64) {
    let mut err = std::io::stderr().lock();
    let _ = if total > 0 {
        write!(
            err,
            "\r{transferred}/{total} bytes ({}%)",
            transferred.saturating_mul(100) / total
        )
    } else {
        write!(err, "\r{transferred} bytes")
    };
    let _ = err.flush();
}
