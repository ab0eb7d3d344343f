use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use mirrorwatch_core::types::{Config, GroupName, ServiceGroup};
use mirrorwatch_sync::{
    pipeline::{self, SyncScope},
    ControlGate, CycleSummary, GroupStatus, ReportSink, RestartNotifier, SyncEngine,
};

use crate::error::{io_err, DaemonError};
use crate::notifier::HttpRestartNotifier;
use crate::paths::{mirrorwatch_root, socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::sink::LogSink;

/// Timer and watcher jobs beyond this many queued are dropped.
const SYNC_QUEUE_CAPACITY: usize = 8;

/// Reference file path to the groups that list it.
type ReferenceIndex = HashMap<PathBuf, Vec<GroupName>>;

struct SyncJob {
    scope: SyncScope,
    /// Apply regardless of the gate for this cycle.
    force: bool,
    source: &'static str,
    respond_to: Option<oneshot::Sender<Result<CycleSummary, String>>>,
}

/// Advisory state published after each cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub groups: Vec<GroupStatus>,
    pub last_cycle: Option<CycleSummary>,
    pub cycles_completed: u64,
}

/// State readable without waiting on the worker.
struct Shared {
    gate: ControlGate,
    snapshot: RwLock<StatusSnapshot>,
    started_at_unix: u64,
    interval_secs: u64,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            gate: ControlGate::new(config.apply_enabled),
            snapshot: RwLock::new(StatusSnapshot {
                groups: config.groups.iter().map(GroupStatus::from).collect(),
                ..StatusSnapshot::default()
            }),
            started_at_unix: unix_seconds_now(),
            interval_secs: config.interval_secs,
        }
    }
}

/// Load configuration, start the daemon runtime, and block until it exits.
pub fn start_blocking(home: &Path, config_path: &Path, log_json: bool) -> Result<(), DaemonError> {
    init_tracing(log_json);
    let config = mirrorwatch_core::config::load_at(config_path)?;
    tracing::info!(
        config = %config_path.display(),
        groups = config.groups.len(),
        apply_enabled = config.apply_enabled,
        interval_secs = config.interval_secs,
        "configuration loaded",
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon with the HTTP restart notifier.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let notifier = HttpRestartNotifier::new(Duration::from_secs(config.notify_timeout_secs));
    run_with_notifier(home, config, notifier).await
}

/// Run the daemon: timer, reference watcher, worker, and socket server.
pub async fn run_with_notifier<N>(
    home: PathBuf,
    config: Config,
    notifier: N,
) -> Result<(), DaemonError>
where
    N: RestartNotifier + 'static,
{
    ensure_runtime_dirs(&home)?;

    let shared = Arc::new(Shared::new(&config));
    let engine = Arc::new(SyncEngine::from_config(&config, notifier));
    let index = config
        .watch_reference
        .then(|| reference_index(&config.groups));
    let interval_secs = config.interval_secs;
    let groups = config.groups;

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(SYNC_QUEUE_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let timer_handle = {
        let shutdown = shutdown_tx.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = timer_task(interval_secs, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(index, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result =
                sync_processor_task(engine, groups, shared, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let shared = shared.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                shared,
                sync_tx,
                shutdown.clone(),
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(sync_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (timer_result, watcher_result, processor_result, socket_result, signal_result) = tokio::join!(
        timer_handle,
        watcher_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("timer", timer_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn timer_task(
    interval_secs: u64,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // First tick completes immediately: one cycle at startup.
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if !submit_background(&sync_tx, SyncScope::All, "timer") {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn watcher_task(
    index: Option<ReferenceIndex>,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(index) = index.filter(|index| !index.is_empty()) else {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    let watched = register_reference_dirs(&mut watcher, &index)?;
    tracing::info!(
        directories = watched,
        files = index.len(),
        "watching reference files"
    );

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    let path = fs::canonicalize(&path).unwrap_or(path);
                    let Some(scope) = scope_for_path(&index, &path) else {
                        continue;
                    };
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }
                    tracing::debug!(path = %path.display(), scope = %scope.label(), "reference file changed");
                    if !submit_background(&sync_tx, scope, "watcher") {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn sync_processor_task<N>(
    engine: Arc<SyncEngine<N>>,
    mut groups: Vec<ServiceGroup>,
    shared: Arc<Shared>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    N: RestartNotifier + 'static,
{
    let sink = LogSink;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                // The gate is read once and held for the whole cycle.
                let apply_enabled = job.force || shared.gate.is_enabled();
                tracing::info!(
                    source = job.source,
                    scope = %job.scope.label(),
                    apply_enabled,
                    "cycle starting",
                );

                let engine = engine.clone();
                let scope = job.scope.clone();
                let mut owned = std::mem::take(&mut groups);
                let (returned, sync_result) = tokio::task::spawn_blocking(move || {
                    let result = pipeline::run(&*engine, &mut owned, &scope, apply_enabled);
                    (owned, result)
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;
                groups = returned;

                let outcome = match sync_result {
                    Ok(summary) => {
                        sink.publish(&summary);
                        let mut snapshot = shared.snapshot.write().await;
                        snapshot.groups = groups.iter().map(GroupStatus::from).collect();
                        snapshot.last_cycle = Some(summary.clone());
                        snapshot.cycles_completed += 1;
                        drop(snapshot);
                        Ok(summary)
                    }
                    Err(err) => {
                        tracing::warn!(source = job.source, error = %err, "cycle rejected");
                        Err(err.to_string())
                    }
                };

                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(outcome);
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    shared: Arc<Shared>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let shared = shared.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        shared,
                        sync_tx,
                        shutdown_tx,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    shared: Arc<Shared>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&home, &shared).await),
            "sync" => {
                let scope = match request.group.clone() {
                    Some(group) => SyncScope::Group(GroupName::from(group)),
                    None => SyncScope::All,
                };
                let force = request.force.unwrap_or(false);
                match enqueue_sync(&sync_tx, scope, force, "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "enable" => gate_response(&shared.gate, true),
            "disable" => gate_response(&shared.gate, false),
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

fn gate_response(gate: &ControlGate, enable: bool) -> DaemonResponse {
    let previous = if enable { gate.enable() } else { gate.disable() };
    tracing::info!(apply_enabled = enable, previous, "apply gate changed");
    DaemonResponse::ok(json!({ "apply_enabled": enable, "previous": previous }))
}

async fn build_status_payload(home: &Path, shared: &Shared) -> Value {
    let snapshot = shared.snapshot.read().await.clone();
    json!({
        "running": true,
        "pid": std::process::id(),
        "apply_enabled": shared.gate.is_enabled(),
        "started_at_unix": shared.started_at_unix,
        "interval_secs": shared.interval_secs,
        "cycles_completed": snapshot.cycles_completed,
        "groups": snapshot.groups,
        "last_cycle": snapshot.last_cycle,
        "socket": socket_path(home).display().to_string(),
    })
}

/// Queue a control-channel job, waiting behind in-flight work.
async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    scope: SyncScope,
    force: bool,
    source: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            scope,
            force,
            source,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

/// Queue a timer or watcher job without waiting. Returns `false` once the
/// worker is gone.
fn submit_background(
    sync_tx: &mpsc::Sender<SyncJob>,
    scope: SyncScope,
    source: &'static str,
) -> bool {
    let job = SyncJob {
        scope,
        force: false,
        source,
        respond_to: None,
    };
    match sync_tx.try_send(job) {
        Ok(()) => true,
        Err(TrySendError::Full(job)) => {
            tracing::warn!(source, scope = %job.scope.label(), "sync queue full, dropping job");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

fn reference_index(groups: &[ServiceGroup]) -> ReferenceIndex {
    let mut index = ReferenceIndex::new();
    for group in groups {
        for pair in &group.files {
            let path = fs::canonicalize(&pair.reference_path)
                .unwrap_or_else(|_| pair.reference_path.clone());
            let owners = index.entry(path).or_default();
            if !owners.contains(&group.name) {
                owners.push(group.name.clone());
            }
        }
    }
    index
}

/// A file owned by exactly one group narrows the cycle to that group.
fn scope_for_path(index: &ReferenceIndex, path: &Path) -> Option<SyncScope> {
    match index.get(path)?.as_slice() {
        [only] => Some(SyncScope::Group(only.clone())),
        _ => Some(SyncScope::All),
    }
}

fn register_reference_dirs(
    watcher: &mut RecommendedWatcher,
    index: &ReferenceIndex,
) -> Result<usize, DaemonError> {
    let mut watched = HashSet::new();
    for dir in index.keys().filter_map(|path| path.parent()) {
        if watched.contains(dir) {
            continue;
        }
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %dir.display(), "reference directory missing, not watched");
                continue;
            }
            Err(err) => return Err(io_err(dir, err)),
        }
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %dir.display(), "watching reference directory");
        watched.insert(dir.to_path_buf());
    }
    Ok(watched.len())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = mirrorwatch_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides the `info`
/// default; `log` records from the sync crate are bridged in.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
