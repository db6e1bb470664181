//! Pass identity for stale-result suppression.
//!
//! Every refresh takes a ticket with a strictly increasing id. The latest
//! started id lives in a `watch` channel so an in-flight pass can both poll
//! whether it is still current and await the moment it stops being so.

use tokio::sync::watch;

#[derive(Debug)]
pub struct PassTracker {
    latest: watch::Sender<u64>,
}

impl Default for PassTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PassTracker {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(0);
        Self { latest }
    }

    /// Start a pass. Its id becomes the latest and supersedes every earlier
    /// ticket.
    pub fn begin(&self) -> PassTicket {
        let mut id = 0;
        self.latest.send_modify(|latest| {
            *latest += 1;
            id = *latest;
        });
        PassTicket {
            id,
            latest: self.latest.subscribe(),
        }
    }

    pub fn latest(&self) -> u64 {
        *self.latest.borrow()
    }
}

#[derive(Debug)]
pub struct PassTicket {
    id: u64,
    latest: watch::Receiver<u64>,
}

impl PassTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn latest(&self) -> u64 {
        *self.latest.borrow()
    }

    pub fn is_current(&self) -> bool {
        self.latest() == self.id
    }

    /// Resolves once a newer pass has begun. Never resolves otherwise.
    pub async fn superseded(&mut self) {
        loop {
            if *self.latest.borrow_and_update() != self.id {
                return;
            }
            if self.latest.changed().await.is_err() {
                // Tracker dropped: nothing can supersede us any more.
                std::future::pending::<()>().await;
            }
        }
    }
}
