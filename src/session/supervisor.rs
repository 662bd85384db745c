//! Process supervisor: spawn, read, normalize, watch, terminate

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::liveness::LivenessTracker;
use super::model::{Session, SessionLimits, SessionRecord, SessionRequest, TerminationReason};
use super::pipeline::{PipelineOutput, SessionPipeline};
use super::process::ProcessHandle;
use crate::error::{StreamReadError, SupervisorError};
use crate::monitor::{resolve_state_dir, ActivityMonitor, ActivityProbe, DirectoryProbe, LivenessSignal};
use crate::normalize::{SequenceCounter, UnifiedEvent};
use crate::provider::{ProviderMapping, ProviderRegistry};
use crate::stream::{ChunkOrder, RawChunk, StreamSource};

const READ_BUFFER_BYTES: usize = 8 * 1024;

/// Filesystems with coarse timestamps can date a write slightly before it happened
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Messages from the pipe reader tasks
#[derive(Debug)]
enum ReaderMessage {
    Chunk(RawChunk),
    Eof(StreamSource),
    Failed(StreamReadError),
}

/// Runs agent sessions against a provider registry
pub struct Supervisor {
    registry: Arc<ProviderRegistry>,
    limits: SessionLimits,
}

impl Supervisor {
    pub fn new(registry: Arc<ProviderRegistry>, limits: SessionLimits) -> Self {
        Self { registry, limits }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Run one session to completion.
    ///
    /// Only a failure to start the process is returned as an error. Every
    /// session that reaches `running` produces a record with a termination
    /// reason and all output collected up to that point. When `observer` is
    /// given, each event is also sent to it as soon as it is emitted.
    pub async fn run(
        &self,
        request: SessionRequest,
        cancel: CancellationToken,
        observer: Option<mpsc::UnboundedSender<UnifiedEvent>>,
    ) -> Result<SessionRecord, SupervisorError> {
        let mapping = self.registry.resolve(&request.provider);
        let mut session = Session::new(request.provider.clone());
        let mut pipeline = SessionPipeline::new(
            Arc::clone(&mapping),
            self.registry.ansi(),
            self.limits.decoder,
            SequenceCounter::new(),
        );

        let wall_start = SystemTime::now();
        let (mut process, stdout, stderr) = ProcessHandle::spawn(&request.command)?;
        session.mark_running();
        info!(session = %session.id(), provider = %request.provider, "session running");

        let started = Instant::now();
        let order = ChunkOrder::new();
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let readers = [
            spawn_reader(stdout, StreamSource::Stdout, order.clone(), chunk_tx.clone()),
            spawn_reader(stderr, StreamSource::Stderr, order, chunk_tx),
        ];
        let mut open_streams = readers.len();

        let monitor_stop = cancel.child_token();
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let mut monitoring = match activity_probe(&mapping, &request, wall_start) {
            Some(probe) => {
                info!(location = %probe.location().display(), "watching state location");
                let monitor = ActivityMonitor::new(probe, self.limits.monitor_startup_grace);
                spawn_monitor(monitor, self.limits.poll_interval, started, monitor_stop.clone(), signal_tx);
                true
            }
            None => {
                debug!(provider = %request.provider, "no activity fallback; stream activity only");
                false
            }
        };

        let mut tracker = LivenessTracker::new(started.into_std(), self.limits.activity_grace);
        let mut last_chunk = started;
        let mut exit_status = None;

        let deadline = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(deadline);
        let mut tick = tokio::time::interval(self.limits.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(session = %session.id(), "cancellation requested");
                    break TerminationReason::Cancelled;
                }

                _ = &mut deadline => {
                    warn!(session = %session.id(), timeout_secs = self.limits.timeout.as_secs(), "session exceeded its timeout");
                    break TerminationReason::TimedOut;
                }

                status = process.wait() => match status {
                    Ok(status) => {
                        info!(session = %session.id(), code = ?status.code(), "agent process exited");
                        exit_status = Some(status);
                        break TerminationReason::Exited;
                    }
                    Err(e) => {
                        warn!(session = %session.id(), error = %e, "lost track of agent process");
                        break TerminationReason::ProcessLost;
                    }
                },

                message = chunk_rx.recv(), if open_streams > 0 => match message {
                    Some(ReaderMessage::Chunk(chunk)) => {
                        let now = Instant::now();
                        last_chunk = now;
                        tracker.record_output(now.into_std());
                        session.record_output();
                        deliver(&mut session, observer.as_ref(), pipeline.ingest(chunk));
                    }
                    Some(ReaderMessage::Eof(source)) => {
                        open_streams -= 1;
                        if source == StreamSource::Stdout {
                            debug!(session = %session.id(), "stdout closed while process alive; deferring to activity monitor");
                        }
                    }
                    Some(ReaderMessage::Failed(err)) => {
                        open_streams -= 1;
                        match process.try_wait() {
                            Ok(Some(status)) => {
                                exit_status = Some(status);
                                break TerminationReason::Exited;
                            }
                            _ => warn!(session = %session.id(), error = %err, "pipe read failed; process still alive"),
                        }
                    }
                    None => open_streams = 0,
                },

                signal = signal_rx.recv(), if monitoring => match signal {
                    Some(signal) => {
                        debug!(session = %session.id(), %signal, "activity probe");
                        tracker.record_probe(signal, Instant::now().into_std());
                    }
                    None => monitoring = false,
                },

                _ = tick.tick() => {
                    let now = Instant::now();
                    if pipeline.framing().is_none() && now - last_chunk >= self.limits.poll_interval {
                        deliver(&mut session, observer.as_ref(), pipeline.on_idle());
                    }
                    if tracker.should_time_out(now.into_std()) {
                        let signal = tracker.current(now.into_std());
                        warn!(
                            session = %session.id(),
                            %signal,
                            quiet_secs = tracker.quiet_for(now.into_std()).as_secs(),
                            "no activity within grace window"
                        );
                        break TerminationReason::ActivityTimeout;
                    }
                }
            }
        };

        monitor_stop.cancel();
        if reason != TerminationReason::Exited {
            info!(session = %session.id(), %reason, "stopping agent process");
            exit_status = process.terminate(self.limits.kill_grace).await.or(exit_status);
        }

        // Collect output still in flight, bounded so inherited pipes cannot hold us
        let drain_until = Instant::now() + self.limits.kill_grace;
        while open_streams > 0 {
            match tokio::time::timeout_at(drain_until, chunk_rx.recv()).await {
                Ok(Some(ReaderMessage::Chunk(chunk))) => {
                    deliver(&mut session, observer.as_ref(), pipeline.ingest(chunk));
                }
                Ok(Some(ReaderMessage::Eof(_))) | Ok(Some(ReaderMessage::Failed(_))) => open_streams -= 1,
                Ok(None) => break,
                Err(_) => {
                    debug!(session = %session.id(), "output drain timed out");
                    break;
                }
            }
        }
        for reader in readers {
            reader.abort();
        }

        deliver(&mut session, observer.as_ref(), pipeline.finish());
        let exit_code = exit_status.and_then(|status| status.code());
        session.terminate(reason, exit_code);
        info!(
            session = %session.id(),
            %reason,
            exit_code = ?exit_code,
            events = session.events().len(),
            "session finished"
        );
        Ok(session.into_record())
    }
}

/// Record a pipeline step on the session and forward events to the observer
fn deliver(
    session: &mut Session,
    observer: Option<&mpsc::UnboundedSender<UnifiedEvent>>,
    output: PipelineOutput,
) {
    if let Some(mode) = output.decided {
        session.set_framing(mode);
    }
    for event in output.events {
        if let Some(tx) = observer {
            // A dropped observer does not affect the session
            let _ = tx.send(event.clone());
        }
        session.push_event(event);
    }
}

fn spawn_reader<R>(
    mut reader: R,
    source: StreamSource,
    order: ChunkOrder,
    tx: mpsc::Sender<ReaderMessage>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        loop {
            let message = match reader.read(&mut buf).await {
                Ok(0) => ReaderMessage::Eof(source),
                Ok(n) => ReaderMessage::Chunk(order.tag(source, buf[..n].to_vec())),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(source_err) => ReaderMessage::Failed(StreamReadError {
                    source_stream: source,
                    source: source_err,
                }),
            };
            let done = !matches!(message, ReaderMessage::Chunk(_));
            if tx.send(message).await.is_err() || done {
                break;
            }
        }
    })
}

fn spawn_monitor(
    mut monitor: ActivityMonitor,
    poll_interval: Duration,
    started: Instant,
    stop: CancellationToken,
    tx: mpsc::Sender<LivenessSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {
                    let signal = monitor.poll(started.elapsed()).await;
                    if tx.send(signal).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Probe for the session's state location, if the provider has one
fn activity_probe(
    mapping: &ProviderMapping,
    request: &SessionRequest,
    started: SystemTime,
) -> Option<Arc<dyn ActivityProbe>> {
    if !mapping.registered {
        return None;
    }
    let dir = request.state_dir.as_ref().or(mapping.state_dir.as_ref())?;
    let root = resolve_state_dir(dir, &request.command.base_dir());
    let since = started.checked_sub(MTIME_SLACK).unwrap_or(started);
    let probe = DirectoryProbe::new(root, mapping.watched_files.clone()).modified_since(since);
    Some(Arc::new(probe))
}
