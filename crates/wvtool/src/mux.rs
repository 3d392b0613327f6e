//! Concurrent supervision of several protocol streams
//!
//! Every child gets one reader task for its combined output pipe and one
//! waiter task. They all feed a single bounded channel; the collector on the calling task is
//! the only owner of the per-child aggregators, so no locking is needed.
//! Lines of one child keep their order, lines of different children
//! interleave in whatever order they arrive.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use wvtest::junit::{JunitRecorder, JunitReport};
use wvtest::{
    Aggregator, Emitted, ProcessTag, ProtocolLine, RunSummary, Termination, Verbosity, classify,
};

use crate::error::HarnessError;
use crate::logdir::{LogDir, SectionLogger};
use crate::runner::{self, SpawnedChild, termination_from_status};

/// Default capacity of the line channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Destination for aggregated output
pub trait LineSink {
    /// Write one item; `tag` is set when more than one child is running
    ///
    /// # Errors
    ///
    /// Returns an IO error if the item cannot be written.
    fn emit(&mut self, tag: Option<ProcessTag>, item: &Emitted) -> io::Result<()>;

    /// A stream moved on to a new section
    ///
    /// # Errors
    ///
    /// Returns an IO error if the sink cannot show it.
    fn section_started(
        &mut self,
        _tag: Option<ProcessTag>,
        _source: &str,
        _section: &str,
    ) -> io::Result<()> {
        Ok(())
    }

    /// A line arrived, whether or not anything was emitted for it
    ///
    /// # Errors
    ///
    /// Returns an IO error if the sink cannot show it.
    fn line_seen(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Collects rendered lines in memory
impl LineSink for Vec<(Option<ProcessTag>, Emitted)> {
    fn emit(&mut self, tag: Option<ProcessTag>, item: &Emitted) -> io::Result<()> {
        self.push((tag, item.clone()));
        Ok(())
    }
}

/// Multiplexer settings
#[derive(Debug, Clone)]
pub struct MuxOptions {
    pub verbosity: Verbosity,
    /// Kill a child that stays silent for this long
    pub idle_timeout: Option<Duration>,
    pub channel_capacity: usize,
    /// Record JUnit suites, prefixing every suite name with this string
    pub junit_prefix: Option<String>,
    /// Also write every section to a log file here
    pub logdir: Option<LogDir>,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Full,
            idle_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            junit_prefix: None,
            logdir: None,
        }
    }
}

/// Everything a multiplexed run produced
#[derive(Debug, Clone, Default)]
pub struct MuxOutcome {
    pub summary: RunSummary,
    pub junit: Option<JunitReport>,
}

#[derive(Debug)]
enum MuxEvent {
    Line {
        tag: ProcessTag,
        line: ProtocolLine,
    },
    Exited {
        tag: ProcessTag,
        status: io::Result<Termination>,
    },
}

#[derive(Debug)]
struct ChildState {
    display_tag: Option<ProcessTag>,
    aggregator: Aggregator,
    junit: Option<JunitRecorder>,
    log: Option<SectionLogger>,
    kill: watch::Sender<bool>,
    forced: Option<Termination>,
    last_activity: Instant,
}

impl ChildState {
    fn force(&mut self, termination: Termination) {
        if self.forced.is_none() {
            self.forced = Some(termination);
            self.kill.send_replace(true);
        }
    }
}

/// Supervises a set of already spawned children
#[derive(Debug, Clone, Default)]
pub struct Multiplexer {
    options: MuxOptions,
}

impl Multiplexer {
    #[must_use]
    pub fn new(options: MuxOptions) -> Self {
        Self { options }
    }

    /// Run every child to completion, writing aggregated output to `sink`
    ///
    /// When `shutdown` resolves, every child still running is terminated and
    /// its stream ends as [`Termination::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Io` if the sink fails, or `HarnessError::Join`
    /// if a supervising task panicked.
    pub async fn run<S, F>(
        &self,
        children: Vec<SpawnedChild>,
        sink: &mut S,
        shutdown: F,
    ) -> Result<MuxOutcome, HarnessError>
    where
        S: LineSink + ?Sized,
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let tagged = children.len() > 1;
        let mut states = HashMap::with_capacity(children.len());
        let mut waiters = Vec::with_capacity(children.len());

        for (index, spawned) in children.into_iter().enumerate() {
            let fallback = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let tag = ProcessTag(spawned.id().unwrap_or(fallback));
            let (kill_tx, kill_rx) = watch::channel(false);
            debug!(%tag, command = %spawned.label, "supervising child");

            states.insert(
                tag,
                ChildState {
                    display_tag: tagged.then_some(tag),
                    aggregator: Aggregator::with_verbosity(
                        spawned.label.clone(),
                        self.options.verbosity,
                    ),
                    junit: self
                        .options
                        .junit_prefix
                        .as_ref()
                        .map(|prefix| JunitRecorder::new(prefix.clone(), spawned.label.clone())),
                    log: self
                        .options
                        .logdir
                        .as_ref()
                        .map(|dir| dir.logger(spawned.label.clone())),
                    kill: kill_tx,
                    forced: None,
                    last_activity: Instant::now(),
                },
            );
            waiters.push(supervise(spawned, tag, tx.clone(), kill_rx));
        }
        drop(tx);

        let mut runs = Vec::with_capacity(states.len());
        let mut junit = self.options.junit_prefix.as_ref().map(|_| JunitReport::default());
        let mut shutdown = std::pin::pin!(shutdown);
        let mut cancelled = false;

        while !states.is_empty() {
            let deadline = self.next_deadline(&states);
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        MuxEvent::Line { tag, line } => {
                            if let Some(state) = states.get_mut(&tag) {
                                state.last_activity = Instant::now();
                                let event = classify(line.text());
                                if let Some(recorder) = state.junit.as_mut() {
                                    recorder.observe(line.text(), &event);
                                }
                                if let Some(log) = state.log.as_mut() {
                                    log.observe(&event)?;
                                }
                                let opened = state.aggregator.sections_opened();
                                for item in state.aggregator.consume(event) {
                                    sink.emit(state.display_tag, &item)?;
                                }
                                if state.aggregator.sections_opened() != opened {
                                    let aggregator = &state.aggregator;
                                    if let (Some(source), Some(section)) =
                                        (aggregator.current_source(), aggregator.current_section())
                                    {
                                        sink.section_started(state.display_tag, source, section)?;
                                    }
                                }
                                sink.line_seen()?;
                            }
                        }
                        MuxEvent::Exited { tag, status } => {
                            let Some(state) = states.remove(&tag) else { continue };
                            let termination = match (state.forced, status) {
                                (Some(forced), _) => forced,
                                (None, Ok(termination)) => termination,
                                (None, Err(e)) => {
                                    warn!(%tag, error = %e, "could not observe child exit");
                                    Termination::Exited(-1)
                                }
                            };
                            if !termination.is_clean() {
                                warn!(%tag, stream = %state.aggregator.label(), %termination, "child ended abnormally");
                            }
                            let (mut result, rest) = state.aggregator.finish(termination);
                            for item in &rest {
                                sink.emit(state.display_tag, item)?;
                            }
                            result.tag = state.display_tag;
                            if let (Some(report), Some(recorder)) = (junit.as_mut(), state.junit) {
                                report.merge(recorder.finish());
                            }
                            if let Some(log) = state.log {
                                log.finish()?;
                            }
                            runs.push(result);
                        }
                    }
                }
                () = &mut shutdown, if !cancelled => {
                    cancelled = true;
                    warn!(running = states.len(), "interrupted, terminating children");
                    for state in states.values_mut() {
                        state.force(Termination::Cancelled);
                    }
                }
                () = sleep_until(deadline) => {
                    let now = Instant::now();
                    for (tag, state) in &mut states {
                        if state.forced.is_none() && self.is_idle(state, now) {
                            warn!(%tag, stream = %state.aggregator.label(), "no output before timeout, killing child");
                            state.force(Termination::TimedOut);
                        }
                    }
                }
            }
        }

        for waiter in waiters {
            waiter.await?;
        }
        Ok(MuxOutcome {
            summary: RunSummary::new(runs),
            junit,
        })
    }

    fn next_deadline(&self, states: &HashMap<ProcessTag, ChildState>) -> Option<Instant> {
        let timeout = self.options.idle_timeout?;
        states
            .values()
            .filter(|s| s.forced.is_none())
            .map(|s| s.last_activity + timeout)
            .min()
    }

    fn is_idle(&self, state: &ChildState, now: Instant) -> bool {
        self.options
            .idle_timeout
            .is_some_and(|timeout| now >= state.last_activity + timeout)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn supervise(
    spawned: SpawnedChild,
    tag: ProcessTag,
    tx: mpsc::Sender<MuxEvent>,
    mut kill_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let SpawnedChild { mut child, output, .. } = spawned;
    let pid = child.id();
    let reader = spawn_reader(output, tag, tx.clone());

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            true = killed(&mut kill_rx) => runner::terminate(&mut child).await,
        };

        // Descendants may keep the pipe open after the leader is gone
        let abort = reader.abort_handle();
        let drain = async {
            match reader.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%tag, error = %e, "error reading child output"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(%tag, error = %e, "reader task failed"),
            }
        };
        let give_up = async {
            if killed(&mut kill_rx).await {
                tokio::time::sleep(runner::KILL_GRACE).await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            () = drain => {}
            () = give_up => {
                if let Some(pid) = pid {
                    runner::kill_process_group(pid);
                }
                abort.abort();
            }
        }

        let status = status.map(termination_from_status);
        debug!(%tag, ?status, "child finished");
        if tx.send(MuxEvent::Exited { tag, status }).await.is_err() {
            debug!(%tag, "collector gone before exit was reported");
        }
    })
}

async fn killed(kill_rx: &mut watch::Receiver<bool>) -> bool {
    kill_rx.wait_for(|kill| *kill).await.is_ok()
}

fn spawn_reader<R>(
    pipe: R,
    tag: ProcessTag,
    tx: mpsc::Sender<MuxEvent>,
) -> JoinHandle<io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            // An unterminated fragment at EOF is still forwarded as a line
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = ProtocolLine::from_bytes(&buf).with_tag(tag);
            if tx.send(MuxEvent::Line { tag, line }).await.is_err() {
                break;
            }
        }
        Ok(())
    })
}
