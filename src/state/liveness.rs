// liveness.rs - uplink liveness monitor
//
// ts6-pseudoserver - TS6 pseudo-server
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::*;

pub(super) const PING_CHECK_PERIOD: Duration = Duration::from_secs(120);
pub(super) const PING_TIMEOUT: Duration = Duration::from_secs(240);

/// Time of last PING from uplink. Shared between receive loop and monitor.
#[derive(Debug)]
pub(crate) struct LastPing {
    base: Instant,
    // milliseconds since base
    millis: AtomicU64,
}

impl LastPing {
    pub(crate) fn new() -> LastPing {
        LastPing{ base: Instant::now(), millis: AtomicU64::new(0) }
    }

    pub(crate) fn mark(&self) {
        let millis = self.base.elapsed().as_millis() as u64;
        self.millis.store(millis, Ordering::SeqCst);
    }

    // time since last PING.
    pub(crate) fn elapsed(&self) -> Duration {
        let last = Duration::from_millis(self.millis.load(Ordering::SeqCst));
        self.base.elapsed().saturating_sub(last)
    }
}

/// Background task that sends elapsed silence time to receive loop
/// once the uplink has been silent for too long.
pub(crate) struct LivenessMonitor {
    stop_sender: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LivenessMonitor {
    pub(crate) fn start(last_ping: Arc<LastPing>, timeout_sender: UnboundedSender<Duration>,
            period: Duration, threshold: Duration) -> LivenessMonitor {
        let (stop_sender, stop_receiver) = oneshot::channel();
        let handle = tokio::spawn(monitor_loop(last_ping, timeout_sender, period,
                    threshold, stop_receiver));
        LivenessMonitor{ stop_sender, handle }
    }

    // returns after the monitor task has finished.
    pub(crate) async fn stop(self) {
        // task can already be finished after timeout
        let _ = self.stop_sender.send(());
        if let Err(e) = self.handle.await {
            error!("Liveness monitor failed: {}", e);
        }
    }
}

async fn monitor_loop(last_ping: Arc<LastPing>, timeout_sender: UnboundedSender<Duration>,
            period: Duration, threshold: Duration, mut stop_receiver: oneshot::Receiver<()>) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = &mut stop_receiver => {
                debug!("Liveness monitor stopped");
                break;
            }
            _ = ticker.tick() => {
                let elapsed = last_ping.elapsed();
                if elapsed >= threshold {
                    warn!("No PING from uplink for {} seconds", elapsed.as_secs());
                    let _ = timeout_sender.send(elapsed);
                    break;
                }
            }
        }
    }
}
