// One-way stop signal between the pool and its worker loops.
//
// The pool keeps the sender; every worker loop gets a token. The flag only
// ever goes from running to stopping, and it is sticky: a token that starts
// observing after the signal fired still sees it.

use tokio::sync::watch;

/// Create the sender/token pair for one pool generation.
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (stop, initial) = watch::channel(false);
    (ShutdownSender { stop }, ShutdownToken { stop: initial })
}

/// Pool-side half: flips the stop flag and mints tokens for new workers.
pub struct ShutdownSender {
    stop: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Request stop. Idempotent; unblocks every waiting token.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }

    /// Token for one more worker loop.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            stop: self.stop.subscribe(),
        }
    }
}

/// Worker-side half.
#[derive(Clone)]
pub struct ShutdownToken {
    stop: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// True once stop has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolve when stop is requested. Returns immediately when the flag is
    /// already set, so a token obtained late cannot sleep through it.
    pub async fn wait(&mut self) {
        let _ = self.stop.wait_for(|stopped| *stopped).await;
    }
}
