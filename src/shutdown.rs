//! Cooperative shutdown signal shared by the three engine loops and the OS
//! signal listener. Lifted from the teacher's `lib::shutdown::Shutdown`
//! (`examples/devtari-io-cronback/lib/shutdown.rs`): a single broadcastable
//! termination signal over a `tokio::sync::broadcast` channel, matching
//! `spec.md` §9's "Shutdown signal passing" note.

use tokio::sync::broadcast;

pub struct Shutdown {
    shutdown: bool,
    notify: broadcast::Sender<()>,
    watch: broadcast::Receiver<()>,
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        let notify = self.notify.clone();
        let watch = notify.subscribe();
        Self {
            shutdown: self.shutdown,
            notify,
            watch,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        let (notify, watch) = broadcast::channel(1);
        Self {
            shutdown: false,
            notify,
            watch,
        }
    }
}

impl Shutdown {
    /// Waits for the shutdown signal, returning immediately if it has
    /// already been received.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        // Only one value is ever sent, so a lag error can't happen.
        let _ = self.watch.recv().await;
        self.shutdown = true;
    }

    pub fn broadcast_shutdown(&self) {
        // Nobody listening (engine never started, or already shut down) is
        // not an error.
        let _ = self.notify.send(());
    }
}
