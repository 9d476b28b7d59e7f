//! Client for the analysis engine's JSON line protocol.
//!
//! An [`EngineSession`] owns the engine process and three threads:
//!
//! - the writer drains a bounded queue, registers each query's callback under
//!   its id and writes the query as one JSON line;
//! - the reader parses one response per line and hands it to the callback
//!   registered for its id;
//! - the diagnostics thread forwards the engine's stderr to the log.
//!
//! Responses may arrive in any order. Callbacks run on the reader thread and
//! must not touch a [`GameTree`] directly; the game controller posts them
//! into its own mailbox instead.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::analysis::{AnalysisKey, AnalysisPayload};
use crate::constants::QUERY_QUEUE_CAPACITY;
use crate::error::{AnalysisError, EngineStartupError};
use crate::position::str_coord;
use crate::profiles::{override_settings, ruleset_name};
use crate::settings::EngineCommand;
use crate::tree::{GameTree, NodeId};

/// What a query's callback receives.
pub type Reply = Result<AnalysisPayload, AnalysisError>;

pub type Callback = Box<dyn FnOnce(Reply) + Send + 'static>;

/// One analysis request as written to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: String,
    pub rules: String,
    pub board_x_size: usize,
    pub board_y_size: usize,
    /// `[colour, GTP vertex]` pairs from the root.
    pub moves: Vec<[String; 2]>,
    pub initial_stones: Vec<[String; 2]>,
    pub include_policy: bool,
    pub include_ownership: bool,
    pub max_visits: u32,
    pub override_settings: Map<String, Value>,
}

impl Query {
    /// Query for the position at `node` under `key`. `None` for a stale node.
    ///
    /// The full move list is sent so the engine can rebuild the position. The
    /// id reads `{path length}_{last move}_{profile}_{visits}v_{counter}`.
    pub fn new(
        tree: &GameTree,
        node: NodeId,
        key: &AnalysisKey,
        max_visits: u32,
        counter: u64,
    ) -> Option<Self> {
        let path = tree.path_from_root(node);
        if path.is_empty() {
            return None;
        }
        let moves: Vec<[String; 2]> = tree
            .moves_from_root(node)
            .into_iter()
            .map(|p| [p.color.letter().to_string(), str_coord(p.mv)])
            .collect();
        let (settings, visits) = override_settings(key, max_visits);
        let last = moves.last().map_or("root", |m| m[1].as_str());
        let id = format!("{}_{last}_{key}_{visits}v_{counter}", path.len());
        Some(Self {
            id,
            rules: ruleset_name(&tree.info.rules),
            board_x_size: tree.size(),
            board_y_size: tree.size(),
            moves,
            initial_stones: Vec::new(),
            include_policy: true,
            include_ownership: false,
            max_visits: visits,
            override_settings: settings,
        })
    }
}

/// Anything that can answer analysis queries.
pub trait AnalysisBackend: Send + Sync {
    /// Queue `query` without blocking. `callback` runs once with the reply,
    /// or never if the reply is lost.
    fn submit(&self, query: Query, callback: Callback);

    /// Queries submitted and not yet answered.
    fn num_outstanding_queries(&self) -> usize;

    /// Next value of the per-session query counter.
    fn next_counter(&self) -> u64;

    /// Build and submit the query for `node` under `key`.
    fn analyze(
        &self,
        tree: &GameTree,
        node: NodeId,
        key: &AnalysisKey,
        max_visits: u32,
        callback: Callback,
    ) {
        match Query::new(tree, node, key, max_visits, self.next_counter()) {
            Some(query) => self.submit(query, callback),
            None => callback(Err(AnalysisError::unavailable(
                format!("node_{}", node.index()),
                "node no longer exists",
            ))),
        }
    }
}

struct Outgoing {
    query: Query,
    callback: Callback,
}

type PendingMap = Arc<Mutex<HashMap<String, Callback>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running analysis engine.
pub struct EngineSession {
    sender: Option<Sender<Outgoing>>,
    pending: PendingMap,
    outstanding: Arc<AtomicUsize>,
    counter: AtomicU64,
    child: Option<Child>,
    writer: Option<JoinHandle<()>>,
}

impl EngineSession {
    /// Start the engine and confirm it survives the startup grace period.
    pub fn spawn(command: &EngineCommand) -> Result<Self, EngineStartupError> {
        log::info!("starting engine: {}", command.display());
        let mut child = Command::new(&command.executable)
            .args(command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineStartupError::Spawn {
                program: command.executable.clone(),
                source,
            })?;

        thread::sleep(Duration::from_millis(command.startup_grace_ms));
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return Err(EngineStartupError::ExitedEarly {
                    status,
                    stderr: stderr.trim().to_string(),
                });
            }
            Ok(None) => {}
            Err(err) => log::warn!("could not poll engine process: {err}"),
        }

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            (stdin, stdout, _) => {
                let stream = if stdin.is_none() {
                    "stdin"
                } else if stdout.is_none() {
                    "stdout"
                } else {
                    "stderr"
                };
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineStartupError::MissingPipe { stream });
            }
        };

        let mut session = Self::from_streams(stdout, stdin, stderr)?;
        session.child = Some(child);
        Ok(session)
    }

    /// Run the protocol over arbitrary streams: `output` is what the engine
    /// writes, `input` is where queries go, `diagnostics` is logged.
    pub fn from_streams<R, W, E>(
        output: R,
        input: W,
        diagnostics: E,
    ) -> Result<Self, EngineStartupError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
        E: Read + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(QUERY_QUEUE_CAPACITY);
        let pending: PendingMap = Arc::default();
        let outstanding = Arc::new(AtomicUsize::new(0));

        let writer = {
            let pending = Arc::clone(&pending);
            let outstanding = Arc::clone(&outstanding);
            thread::Builder::new()
                .name("engine-writer".into())
                .spawn(move || write_loop(receiver, input, &pending, &outstanding))
                .map_err(|source| EngineStartupError::Thread {
                    thread: "writer",
                    source,
                })?
        };
        {
            let pending = Arc::clone(&pending);
            let outstanding = Arc::clone(&outstanding);
            thread::Builder::new()
                .name("engine-reader".into())
                .spawn(move || read_loop(BufReader::new(output), &pending, &outstanding))
                .map_err(|source| EngineStartupError::Thread {
                    thread: "reader",
                    source,
                })?;
        }
        thread::Builder::new()
            .name("engine-stderr".into())
            .spawn(move || log_diagnostics(BufReader::new(diagnostics)))
            .map_err(|source| EngineStartupError::Thread {
                thread: "diagnostics",
                source,
            })?;

        Ok(Self {
            sender: Some(sender),
            pending,
            outstanding,
            counter: AtomicU64::new(0),
            child: None,
            writer: Some(writer),
        })
    }

    /// Queries whose callback is registered and waiting for a reply.
    pub fn num_awaiting_reply(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Stop accepting queries, then stop and reap the engine process.
    pub fn close(&mut self) {
        drop(self.sender.take());
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                log::debug!("engine already stopped: {err}");
            }
            match child.wait() {
                Ok(status) => log::info!("engine exited ({status})"),
                Err(err) => log::warn!("failed to reap engine: {err}"),
            }
        }
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::error!("engine writer thread panicked");
            }
        }
    }
}

impl AnalysisBackend for EngineSession {
    fn submit(&self, query: Query, callback: Callback) {
        let Some(sender) = &self.sender else {
            callback(Err(AnalysisError::transport(query.id, "engine session is closed")));
            return;
        };
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(Outgoing { query, callback }) {
            Ok(()) => {}
            Err(TrySendError::Full(out)) => {
                log::warn!("query queue full, rejecting {}", out.query.id);
                (out.callback)(Err(AnalysisError::unavailable(
                    out.query.id,
                    "query queue is full",
                )));
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
            Err(TrySendError::Disconnected(out)) => {
                (out.callback)(Err(AnalysisError::transport(
                    out.query.id,
                    "engine writer has stopped",
                )));
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn num_outstanding_queries(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_loop<W: Write>(
    receiver: Receiver<Outgoing>,
    mut input: W,
    pending: &PendingMap,
    outstanding: &AtomicUsize,
) {
    for Outgoing { query, callback } in receiver {
        let id = query.id.clone();
        let line = match serde_json::to_string(&query) {
            Ok(line) => line,
            Err(err) => {
                callback(Err(AnalysisError::transport(id, err.to_string())));
                outstanding.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
        };
        // Registered before writing so a fast reply always finds it.
        lock(pending).insert(id.clone(), callback);
        log::debug!("sending query {id}");

        if let Err(err) = writeln!(input, "{line}").and_then(|()| input.flush()) {
            log::error!("error sending query {id}: {err}");
            let callback = lock(pending).remove(&id);
            if let Some(callback) = callback {
                callback(Err(AnalysisError::transport(id, err.to_string())));
                outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
    log::debug!("engine writer stopped");
}

fn read_loop<R: BufRead>(output: R, pending: &PendingMap, outstanding: &AtomicUsize) {
    for line in output.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => dispatch(&line, pending, outstanding),
            Err(err) => {
                log::error!("failed to read engine output: {err}");
                break;
            }
        }
    }
    log::info!("engine output closed");
}

/// Route one response line to its callback.
fn dispatch(line: &str, pending: &PendingMap, outstanding: &AtomicUsize) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            log::error!("failed to parse engine response ({err}): {}", line.trim());
            return;
        }
    };
    let Some(id) = value.get("id").and_then(Value::as_str).map(str::to_owned) else {
        log::error!("received response without id: {}", line.trim());
        return;
    };

    let reply = match value.get("error") {
        Some(error) => {
            let message = error.as_str().map_or_else(|| error.to_string(), str::to_owned);
            Err(AnalysisError::new(id.clone(), message))
        }
        None => match serde_json::from_value::<AnalysisPayload>(value.clone()) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                log::error!("dropping malformed response {id}: {err}");
                return;
            }
        },
    };

    let callback = lock(pending).remove(&id);
    let Some(callback) = callback else {
        log::error!("received response with unknown id: {id}");
        return;
    };
    log::debug!("received response: {}", summarize_response(&value));
    // Counted until the callback has run, so a waiter never sees zero
    // outstanding queries while a reply is still being delivered.
    callback(reply);
    outstanding.fetch_sub(1, Ordering::SeqCst);
}

fn log_diagnostics<R: BufRead>(diagnostics: R) {
    for line in diagnostics.lines() {
        match line {
            Ok(line) => log::info!("[engine] {}", line.trim()),
            Err(err) => {
                log::debug!("engine stderr closed: {err}");
                break;
            }
        }
    }
}

/// A response with policies and the move list shortened for logging.
pub fn summarize_response(response: &Value) -> Value {
    let mut summary = response.clone();
    for key in ["policy", "humanPolicy"] {
        if let Some(floats) = summary.get(key).and_then(Value::as_array) {
            let short = json!(format!("[{} floats]", floats.len()));
            summary[key] = short;
        }
    }
    if let Some(infos) = response.get("moveInfos").and_then(Value::as_array) {
        let mut moves: Vec<Value> = infos
            .iter()
            .take(5)
            .map(|info| {
                json!({
                    "move": info.get("move"),
                    "visits": info.get("visits"),
                    "winrate": info.get("winrate"),
                })
            })
            .collect();
        if infos.len() > 5 {
            moves.push(json!(format!("{} more...", infos.len() - 5)));
        }
        summary["moveInfos"] = Value::Array(moves);
    }
    summary
}
