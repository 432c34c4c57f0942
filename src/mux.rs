use futures::future;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::config::{MuxConfig, MAX_STREAMS};
use crate::error::{Result, SwitchError};
use crate::output::{OutputBuffer, Sink};
use crate::stream::{ReadOutcome, Stream, READ_CHUNK};

/// The failover switch: a priority-ordered set of input streams, the active
/// index, the output buffer and the downstream sink, driven by a
/// single-threaded readiness loop.
///
/// Stream membership is fixed at construction; individual streams cycle
/// between running and stopped indefinitely. The active index only decreases
/// via failback (a higher-priority stream produced data) and only increases
/// via promotion (the active stream stayed silent past the grace period).
/// Within a tick, timeouts are resolved in ascending rank order before reads,
/// so a same-tick failback always wins over a same-tick promotion.
pub struct Mux<S: Sink> {
    streams: Vec<Stream>,
    active: usize,
    out: OutputBuffer,
    sink: S,
    grace: Duration,
}

impl<S: Sink> Mux<S> {
    /// Builds a switch from priority-ordered command lines.
    ///
    /// The first group is rank 0 (highest priority). Fails if no group is
    /// given, a group is empty, or more than [`MAX_STREAMS`] are configured.
    pub fn new(groups: Vec<Vec<String>>, config: MuxConfig, sink: S) -> Result<Self> {
        if groups.is_empty() {
            return Err(SwitchError::Config("at least one stream is required".into()));
        }
        if groups.iter().any(Vec::is_empty) {
            return Err(SwitchError::Config("empty command group".into()));
        }
        if groups.len() > MAX_STREAMS {
            return Err(SwitchError::Config(format!(
                "at most {} streams are supported, {} configured",
                MAX_STREAMS,
                groups.len()
            )));
        }

        let now = Instant::now();
        let streams = groups
            .into_iter()
            .enumerate()
            .map(|(rank, argv)| Stream::new(rank, argv, now + config.grace))
            .collect();
        Ok(Self {
            streams,
            active: 0,
            out: OutputBuffer::with_capacity(config.out_capacity),
            sink,
            grace: config.grace,
        })
    }

    /// Runs the switch forever.
    ///
    /// Each tick: reap exited producers, evaluate per-stream timeouts in
    /// ascending rank order (may promote), sweep readable streams in ascending
    /// rank order (may fail back), try to drain the output buffer, then sleep
    /// until the next deadline or readiness event.
    pub async fn run(&mut self) -> Result<()> {
        self.startup(Instant::now());
        loop {
            let now = Instant::now();
            self.reap_exited();
            self.evaluate_timeouts(now);
            self.poll_reads(now);
            self.out.drain(&self.sink);

            let wake = self.next_wakeup(Instant::now());
            self.wait(wake).await;
        }
    }

    /// Cold start: give every stream one grace period and launch only the
    /// highest-priority one. Promotion then proceeds strictly one rank per
    /// elapsed grace period instead of racing every producer at boot.
    fn startup(&mut self, now: Instant) {
        for stream in &mut self.streams {
            stream.deadline = now + self.grace;
        }
        self.start_stream(0, now);
    }

    /// Drains exit notifications: collects the status of every exited
    /// producer. The pipe stays open so bytes written before the exit still
    /// reach the output; its end-of-stream is what stops the stream, and the
    /// timeout policy decides later whether to restart it.
    fn reap_exited(&mut self) {
        for stream in &mut self.streams {
            // Nothing to reap without a child handle (stopped, or already reaped).
            let Some(pid) = stream.producer.id() else {
                continue;
            };
            if let Some(status) = stream.producer.poll_exit() {
                debug!("[{}] reaped pid {} ({})", stream.rank, pid, status);
            }
        }
    }

    /// Timeout policy, ascending rank, for every stream whose deadline passed:
    /// promote past a stalled active stream, then (re)start any stopped stream
    /// that is still eligible (rank at or above the active one). The deadline
    /// is re-armed before the start attempt, giving fixed-interval retries.
    fn evaluate_timeouts(&mut self, now: Instant) {
        for i in 0..self.streams.len() {
            if self.streams[i].deadline > now {
                continue;
            }
            if i == self.active && self.active + 1 < self.streams.len() {
                self.active += 1;
                self.out.clear();
                info!("[{}] silent past grace period, promoting stream {}", i, self.active);
            }
            if !self.streams[i].is_running() && i <= self.active {
                self.start_stream(i, now);
            }
        }
    }

    fn start_stream(&mut self, i: usize, now: Instant) {
        let stream = &mut self.streams[i];
        stream.deadline = now + self.grace;
        debug!("[{}] launching producer: {}", i, stream.producer.argv().join(" "));
        if let Err(e) = stream.producer.start() {
            warn!("[{}] failed to start producer: {}", i, e);
        }
    }

    /// Readability sweep, ascending rank, one non-blocking read per stream.
    fn poll_reads(&mut self, now: Instant) {
        let mut chunk = [0u8; READ_CHUNK];
        for i in 0..self.streams.len() {
            match self.streams[i].try_read(&mut chunk) {
                ReadOutcome::Data(n) => {
                    self.streams[i].deadline = now + self.grace;
                    self.handle_data(i, &chunk[..n]);
                }
                ReadOutcome::Closed => {
                    info!("[{}] input closed, stopping producer", i);
                    self.streams[i].producer.stop();
                    self.streams[i].deadline = now + self.grace;
                }
                ReadOutcome::NotReady | ReadOutcome::NotRunning => {}
            }
        }
    }

    /// A stream produced bytes. A rank above the active one takes over
    /// immediately: the output buffer is emptied and every lower-priority
    /// stream is torn down to release its process and pipe. Packets are then
    /// forwarded only when the stream is the active one; other streams stay
    /// aligned but their packets are discarded.
    fn handle_data(&mut self, i: usize, data: &[u8]) {
        if i < self.active {
            info!("[{}] producing again, failing back from stream {}", i, self.active);
            self.active = i;
            self.out.clear();
            for j in (i + 1)..self.streams.len() {
                if self.streams[j].is_running() {
                    info!("[{}] stopping demoted producer", j);
                    self.streams[j].producer.stop();
                }
            }
        }

        let packets = self.streams[i].resync.feed(data);
        if i != self.active {
            return;
        }
        for packet in packets {
            if !self.out.append(&packet) {
                warn!("[{}] output buffer full, dropping packet", i);
            }
        }
    }

    /// Earliest pending deadline, capped at one grace period from now.
    /// Already-elapsed deadlines (a running stream that stays stalled) must
    /// not turn the loop into a busy spin.
    fn next_wakeup(&self, now: Instant) -> Instant {
        let mut wake = now + self.grace;
        for stream in &self.streams {
            if stream.deadline > now && stream.deadline < wake {
                wake = stream.deadline;
            }
        }
        wake
    }

    /// Sleeps until the next deadline, a stream becomes readable or exits, or
    /// the sink becomes writable while output is pending.
    async fn wait(&mut self, wake: Instant) {
        let Self { streams, sink, out, .. } = self;
        let events: Vec<_> = streams.iter_mut().filter_map(Stream::event).collect();
        let stream_event = async {
            if events.is_empty() {
                future::pending::<()>().await
            } else {
                let _ = future::select_all(events).await;
            }
        };

        tokio::select! {
            _ = time::sleep_until(wake) => {}
            _ = stream_event => {}
            _ = sink.writable(), if !out.is_empty() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::MockSink;
    use crate::resync::{SYNC_BYTE, TS_PACKET_SIZE};

    fn packet(fill: u8) -> Vec<u8> {
        let mut p = vec![fill; TS_PACKET_SIZE];
        p[0] = SYNC_BYTE;
        p
    }

    fn mux(cmds: &[&str]) -> Mux<MockSink> {
        let groups = cmds
            .iter()
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .collect();
        let config = MuxConfig {
            grace: Duration::from_millis(50),
            out_capacity: 8,
        };
        Mux::new(groups, config, MockSink::with_quota(0)).unwrap()
    }

    #[test]
    fn rejects_bad_configurations() {
        let config = MuxConfig::default();
        assert!(Mux::new(vec![], config.clone(), MockSink::with_quota(0)).is_err());
        assert!(Mux::new(vec![vec![]], config.clone(), MockSink::with_quota(0)).is_err());
        let too_many = vec![vec!["cat".to_string()]; MAX_STREAMS + 1];
        assert!(Mux::new(too_many, config, MockSink::with_quota(0)).is_err());
    }

    #[tokio::test]
    async fn cold_start_launches_only_the_highest_priority_stream() {
        let mut m = mux(&["sleep 5", "sleep 5"]);
        let now = Instant::now();
        m.startup(now);

        assert_eq!(m.active, 0);
        assert!(m.streams[0].is_running());
        assert!(!m.streams[1].is_running());

        // No deadline has elapsed yet, so nothing is promoted.
        m.evaluate_timeouts(now);
        assert_eq!(m.active, 0);
        assert!(!m.streams[1].is_running());
    }

    #[tokio::test]
    async fn promotion_advances_exactly_one_rank_per_elapsed_deadline() {
        let mut m = mux(&["sleep 5", "sleep 5", "sleep 5"]);
        let now = Instant::now();
        m.startup(now);
        m.out.append(&packet(b'a'));

        // Only rank 0 stalls.
        m.streams[0].deadline = now;
        m.evaluate_timeouts(now);
        assert_eq!(m.active, 1);
        assert!(m.out.is_empty(), "buffer is emptied on promotion");
        assert!(m.streams[0].is_running(), "the stalled stream is left running");

        // Rank 0 is no longer the active stream, so a second pass at the same
        // instant does not promote again.
        m.evaluate_timeouts(now);
        assert_eq!(m.active, 1);
    }

    #[tokio::test]
    async fn promotion_stops_at_the_lowest_rank() {
        let mut m = mux(&["sleep 5"]);
        let now = Instant::now();
        m.startup(now);
        m.streams[0].deadline = now;

        m.evaluate_timeouts(now);
        assert_eq!(m.active, 0, "no lower-priority stream to promote to");
    }

    #[tokio::test]
    async fn spawn_failure_is_retried_not_fatal() {
        let mut m = mux(&["/nonexistent/tsswitch-test-cmd", "sleep 5"]);
        let now = Instant::now();
        m.startup(now);
        assert!(!m.streams[0].is_running());

        // First grace period elapses: rank 0 is given up on and retried.
        let later = now + Duration::from_millis(60);
        m.streams[0].deadline = now;
        m.streams[1].deadline = now;
        m.evaluate_timeouts(later);
        assert_eq!(m.active, 1);
        assert!(!m.streams[0].is_running());
        assert!(m.streams[1].is_running());
    }

    #[tokio::test]
    async fn failback_reverts_same_tick_and_tears_down_lower_ranks() {
        let mut m = mux(&["sleep 5", "sleep 5", "sleep 5"]);
        for stream in &mut m.streams {
            stream.producer.start().unwrap();
        }
        m.active = 2;
        m.out.append(&packet(b'z'));

        m.handle_data(0, &packet(b'a'));

        assert_eq!(m.active, 0);
        assert!(m.streams[0].is_running());
        assert!(!m.streams[1].is_running());
        assert!(!m.streams[2].is_running());
        // Buffer was cleared at the switch; only the fresh packet remains.
        assert_eq!(m.out.len(), TS_PACKET_SIZE);
    }

    #[tokio::test]
    async fn non_active_stream_packets_are_discarded() {
        let mut m = mux(&["sleep 5", "sleep 5"]);
        m.active = 0;

        m.handle_data(1, &packet(b'b'));
        assert_eq!(m.active, 0, "lower-priority data never steals the output");
        assert!(m.out.is_empty());
        assert_eq!(m.streams[1].resync.pending(), 0, "still kept aligned");
    }

    #[tokio::test]
    async fn overflow_drops_newest_packet_and_keeps_state() {
        let mut m = mux(&["sleep 5"]);
        for _ in 0..10 {
            m.handle_data(0, &packet(b'a'));
        }
        assert_eq!(m.out.len(), 8 * TS_PACKET_SIZE);
        assert_eq!(m.active, 0);
    }

    #[tokio::test]
    async fn exited_producer_is_reaped_then_stopped_on_eof() {
        let mut m = mux(&["true"]);
        let now = Instant::now();
        m.start_stream(0, now);

        // Wait for the child to exit, then reap it. The stream stays running
        // until its pipe reports end-of-stream.
        loop {
            m.reap_exited();
            if m.streams[0].producer.id().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(m.streams[0].is_running());
        assert!(m.streams[0].producer.poll_exit().is_none(), "status is collected once");

        // With the child handle gone there is no pid left to report; another
        // reap pass skips the stream entirely and changes nothing.
        m.reap_exited();
        assert!(m.streams[0].is_running());

        m.poll_reads(Instant::now());
        assert!(!m.streams[0].is_running());
    }

    #[tokio::test]
    async fn next_wakeup_ignores_elapsed_deadlines() {
        let mut m = mux(&["sleep 5", "sleep 5"]);
        let now = Instant::now();
        m.streams[0].deadline = now; // elapsed
        m.streams[1].deadline = now + Duration::from_millis(10);

        let wake = m.next_wakeup(now);
        assert_eq!(wake, now + Duration::from_millis(10));

        // With every deadline elapsed, the wakeup falls back to one grace.
        m.streams[1].deadline = now;
        assert_eq!(m.next_wakeup(now), now + m.grace);
    }
}
