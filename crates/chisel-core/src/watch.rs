//! File watching: filesystem events drive the transpiler
//!
//! The notify watcher thread only forwards events into a channel. A single
//! loop owns the [`Transpiler`] and handles each event to completion before
//! taking the next one. Every relevant event bumps the last-changed marker;
//! the marker is cleared when the loop stops.

use notify::{EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::ChangeMarker;
use crate::errors::BuildResult;
use crate::paths::{segments, OutputMode};
use crate::transpiler::{TranspileStats, Transpiler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Remove,
    /// Reads and metadata access; never relevant
    Access,
    Other,
}

impl From<&EventKind> for WatchEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => WatchEventKind::Create,
            EventKind::Modify(_) => WatchEventKind::Modify,
            EventKind::Remove(_) => WatchEventKind::Remove,
            EventKind::Access(_) => WatchEventKind::Access,
            EventKind::Any | EventKind::Other => WatchEventKind::Other,
        }
    }
}

/// One filesystem change, absolute or relative to the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: Option<PathBuf>,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
        }
    }

    /// Split a notify event into one event per path
    pub fn from_notify(event: notify::Event) -> Vec<WatchEvent> {
        let kind = WatchEventKind::from(&event.kind);
        if event.paths.is_empty() {
            return vec![WatchEvent { kind, path: None }];
        }
        event
            .paths
            .into_iter()
            .map(|path| WatchEvent {
                kind,
                path: Some(path),
            })
            .collect()
    }
}

/// What to do about one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Malformed or excluded; no marker bump
    Ignore,
    /// Relevant but nothing to compile
    Untracked,
    /// The path no longer exists; drop its outputs
    Remove(PathBuf),
    ReloadActiveRepos,
    Compile {
        path: PathBuf,
        modes: &'static [OutputMode],
    },
}

/// Messages consumed by the loop
#[derive(Debug)]
pub enum LoopMessage {
    Fs(notify::Result<notify::Event>),
    Shutdown,
}

pub struct WatchLoop {
    transpiler: Transpiler,
    marker: ChangeMarker,
    marker_cleared: bool,
}

impl WatchLoop {
    pub fn new(transpiler: Transpiler, marker: ChangeMarker) -> Self {
        Self {
            transpiler,
            marker,
            marker_cleared: false,
        }
    }

    pub fn transpiler(&self) -> &Transpiler {
        &self.transpiler
    }

    pub fn transpiler_mut(&mut self) -> &mut Transpiler {
        &mut self.transpiler
    }

    pub fn marker(&self) -> &ChangeMarker {
        &self.marker
    }

    /// Decide how to handle an event without changing any state
    pub fn plan_event(&self, event: &WatchEvent) -> EventAction {
        let Some(path) = &event.path else {
            debug!("Dropping event without a path: {:?}", event.kind);
            return EventAction::Ignore;
        };
        if event.kind == WatchEventKind::Access {
            return EventAction::Ignore;
        }

        let classifier = self.transpiler.classifier();
        let absolute = classifier.resolve(path);
        let Ok(relative) = absolute.strip_prefix(classifier.root()) else {
            debug!("Dropping event outside the root: {}", absolute.display());
            return EventAction::Ignore;
        };
        let parts = segments(relative);
        if parts.is_empty() || classifier.is_ignored(&absolute) {
            return EventAction::Ignore;
        }

        if !absolute.exists() {
            return EventAction::Remove(absolute);
        }
        if absolute == self.transpiler.active_repos_path() {
            return EventAction::ReloadActiveRepos;
        }

        let Some((repo, rest)) = parts.split_first() else {
            return EventAction::Ignore;
        };
        let layout = self.transpiler.layout();
        if self.transpiler.is_tracked(repo) && layout.covers(repo, rest) {
            EventAction::Compile {
                path: absolute,
                modes: layout.modes_for(repo),
            }
        } else {
            EventAction::Untracked
        }
    }

    /// Carry out a planned action
    pub fn apply(&mut self, action: EventAction) -> BuildResult<TranspileStats> {
        let mut stats = TranspileStats::default();
        if action == EventAction::Ignore {
            return Ok(stats);
        }
        self.marker.bump()?;

        match action {
            EventAction::Ignore | EventAction::Untracked => {}
            EventAction::Remove(path) => {
                stats.removed += self.transpiler.remove_outputs(&path)?;
            }
            EventAction::ReloadActiveRepos => {
                let added = self.transpiler.reload_active_repos();
                info!("reloaded active repos");
                for repo in added {
                    info!("New repo detected in active-repos, transpiling: {}", repo);
                    stats += self.transpiler.transpile_repo(&repo)?;
                }
            }
            EventAction::Compile { path, modes } => {
                stats += self.transpiler.visit_file(&path, modes)?;
            }
        }
        Ok(stats)
    }

    pub fn handle(&mut self, event: &WatchEvent) -> BuildResult<TranspileStats> {
        let action = self.plan_event(event);
        self.apply(action)
    }

    /// Bump the marker, then handle messages until shutdown or until the
    /// sending side goes away. The marker is cleared on the way out, even when
    /// a handler fails.
    pub fn process(&mut self, rx: Receiver<LoopMessage>) -> BuildResult<()> {
        self.start()?;

        let result = self.drain(rx);
        self.shutdown()?;
        result
    }

    fn drain(&mut self, rx: Receiver<LoopMessage>) -> BuildResult<()> {
        while let Ok(message) = rx.recv() {
            match message {
                LoopMessage::Fs(Ok(event)) => {
                    for event in WatchEvent::from_notify(event) {
                        self.handle(&event)?;
                    }
                }
                LoopMessage::Fs(Err(e)) => debug!("Dropping watcher error: {}", e),
                LoopMessage::Shutdown => {
                    info!("Caught interrupt signal, exiting");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Mark everything downstream as untrusted while this loop is alive
    fn start(&mut self) -> BuildResult<()> {
        self.marker.bump()?;
        self.marker_cleared = false;
        Ok(())
    }

    /// Clear the last-changed marker once
    pub fn shutdown(&mut self) -> BuildResult<()> {
        if !self.marker_cleared {
            self.marker.clear_last_changed()?;
            self.marker_cleared = true;
        }
        Ok(())
    }

    /// Watch the root recursively until interrupted
    ///
    /// `initial_pass` runs after the watcher is installed, so changes made
    /// during the first scan are queued rather than lost.
    pub fn run<F>(mut self, initial_pass: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Transpiler) -> BuildResult<TranspileStats>,
    {
        let (tx, rx) = mpsc::channel();

        let signal_tx = tx.clone();
        let signal_marker = self.marker.clone();
        let signalled = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler(move || {
            if signalled.swap(true, Ordering::SeqCst) {
                // second signal while a handler is still busy
                let _ = signal_marker.clear_last_changed();
                std::process::exit(130);
            }
            let _ = signal_tx.send(LoopMessage::Shutdown);
        })?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(LoopMessage::Fs(res));
        })?;
        let root = self.transpiler.classifier().root().to_path_buf();
        watcher.watch(&root, RecursiveMode::Recursive)?;
        self.start()?;

        let stats = match initial_pass(&mut self.transpiler) {
            Ok(stats) => stats,
            Err(e) => {
                self.shutdown()?;
                return Err(e);
            }
        };
        info!(
            "Finished initial transpilation: {} compiled, {} up to date, {} failed",
            stats.compiled, stats.fresh, stats.failed
        );
        info!("Watching {}...", root.display());

        let result = self.process(rx);
        drop(watcher);
        result
    }
}
