//! The single reactor thread (C11, §5): every connection, timer, and DHT
//! round trip runs as a task on one `tokio::task::LocalSet`, so there is
//! never more than one thread driving proxy state. Suspension is ordinary
//! `async`/`.await` underneath; this module exists to make the "exactly
//! one reactor thread" invariant a visible, named thing rather than an
//! implicit property of how `main` happens to call `tokio::spawn`.

use std::future::Future;

use tokio::task::{JoinHandle, LocalSet};

pub struct Reactor {
    local: LocalSet,
}

impl Reactor {
    pub fn new() -> Self {
        Reactor { local: LocalSet::new() }
    }

    /// Schedules `fut` on the reactor's task set. Does not require `Send`:
    /// everything here runs on the one thread that drives `run`.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.local.spawn_local(fut)
    }

    /// Drives the reactor to completion of `driver`, running all spawned
    /// tasks alongside it on the current thread.
    pub async fn run<F: Future>(self, driver: F) -> F::Output {
        self.local.run_until(driver).await
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test]
    async fn spawned_tasks_run_on_the_same_local_set() {
        let reactor = Reactor::new();
        let counter = Rc::new(Cell::new(0));

        let c1 = counter.clone();
        reactor.spawn(async move {
            c1.set(c1.get() + 1);
        });

        let c2 = counter.clone();
        reactor
            .run(async move {
                c2.set(c2.get() + 10);
                // Yield so the previously-spawned task gets a turn before
                // run_until's driver future resolves.
                tokio::task::yield_now().await;
            })
            .await;

        assert_eq!(counter.get(), 11);
    }
}
