/*
 * worker.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * Spoletta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spoletta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spoletta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Single thread running TLS delegated tasks in submission order.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, warn};

use super::engine::DelegatedTask;
use crate::error::{Error, Result};

struct Job {
    tasks: Vec<DelegatedTask>,
    done: oneshot::Sender<bool>,
}

/// Completion of one submitted batch.
#[derive(Debug)]
pub struct TaskTicket {
    done: oneshot::Receiver<bool>,
}

impl TaskTicket {
    fn outcome(received: std::result::Result<bool, ()>) -> Result<()> {
        match received {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Tls("delegated task panicked".into())),
            Err(()) => Err(Error::Tls("delegated task worker stopped".into())),
        }
    }

    /// None while the batch is still running.
    pub fn try_complete(&mut self) -> Option<Result<()>> {
        match self.done.try_recv() {
            Ok(ok) => Some(Self::outcome(Ok(ok))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Self::outcome(Err(()))),
        }
    }

    pub async fn wait(self) -> Result<()> {
        Self::outcome(self.done.await.map_err(|_| ()))
    }
}

/// Outcome of [`DelegatedTaskWorker::submit`].
pub enum Submission {
    Queued(TaskTicket),
    /// The queue is full; the batch is handed back untouched.
    Full(Vec<DelegatedTask>),
}

/// Owns the worker thread; dropping it drains the queue and joins.
pub struct DelegatedTaskWorker {
    sender: Option<SyncSender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl DelegatedTaskWorker {
    /// Start the worker with room for `queue` pending batches.
    pub fn new(queue: usize) -> io::Result<Self> {
        let (sender, receiver) = sync_channel::<Job>(queue);
        let thread = thread::Builder::new()
            .name("spoletta-tls-tasks".into())
            .spawn(move || {
                for job in receiver {
                    let ok = job
                        .tasks
                        .into_iter()
                        .all(|task| catch_unwind(AssertUnwindSafe(task)).is_ok());
                    if !ok {
                        warn!("delegated task panicked");
                    }
                    // The connection may have gone away.
                    let _ = job.done.send(ok);
                }
                debug!("delegated task worker exiting");
            })?;
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Queue `tasks` to run in order. Never blocks: a full queue returns
    /// the batch so the caller can retry later.
    pub fn submit(&self, tasks: Vec<DelegatedTask>) -> Result<Submission> {
        let (done, receiver) = oneshot::channel();
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Tls("delegated task worker stopped".into()))?;
        match sender.try_send(Job { tasks, done }) {
            Ok(()) => Ok(Submission::Queued(TaskTicket { done: receiver })),
            Err(TrySendError::Full(job)) => Ok(Submission::Full(job.tasks)),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::Tls("delegated task worker stopped".into()))
            }
        }
    }
}

impl Drop for DelegatedTaskWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("delegated task worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn queued(submission: Submission) -> TaskTicket {
        match submission {
            Submission::Queued(ticket) => ticket,
            Submission::Full(_) => panic!("worker queue unexpectedly full"),
        }
    }

    fn wait(mut ticket: TaskTicket) -> Result<()> {
        loop {
            if let Some(outcome) = ticket.try_complete() {
                return outcome;
            }
            thread::yield_now();
        }
    }

    #[test]
    fn runs_tasks_in_order_off_thread() {
        let worker = DelegatedTaskWorker::new(4).unwrap();
        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<DelegatedTask> = (0..3)
            .map(|i| {
                let seen = seen.clone();
                Box::new(move || {
                    assert_ne!(thread::current().id(), caller);
                    seen.lock().unwrap().push(i);
                }) as DelegatedTask
            })
            .collect();
        wait(queued(worker.submit(tasks).unwrap())).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn panic_is_reported_and_worker_survives() {
        let worker = DelegatedTaskWorker::new(1).unwrap();
        let ticket = queued(
            worker
                .submit(vec![Box::new(|| panic!("task failure"))])
                .unwrap(),
        );
        assert!(matches!(wait(ticket), Err(Error::Tls(_))));
        wait(queued(worker.submit(vec![Box::new(|| {})]).unwrap())).unwrap();
    }

    #[tokio::test]
    async fn ticket_can_be_awaited() {
        let worker = DelegatedTaskWorker::new(1).unwrap();
        let flag = Arc::new(Mutex::new(false));
        let set = flag.clone();
        let ticket = queued(
            worker
                .submit(vec![Box::new(move || *set.lock().unwrap() = true)])
                .unwrap(),
        );
        ticket.wait().await.unwrap();
        assert!(*flag.lock().unwrap());
    }

    #[test]
    fn full_queue_hands_the_batch_back() {
        let worker = DelegatedTaskWorker::new(1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let running = queued(
            worker
                .submit(vec![Box::new(move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })])
                .unwrap(),
        );
        started_rx.recv().unwrap();
        // The worker is busy; one batch fits in the queue.
        let waiting = queued(worker.submit(vec![Box::new(|| {})]).unwrap());
        let started = Instant::now();
        let Submission::Full(returned) = worker
            .submit(vec![Box::new(|| {}), Box::new(|| {})])
            .unwrap()
        else {
            panic!("expected a full queue");
        };
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(returned.len(), 2);

        release_tx.send(()).unwrap();
        wait(running).unwrap();
        wait(waiting).unwrap();
        wait(queued(worker.submit(returned).unwrap())).unwrap();
    }

    #[test]
    fn drop_joins_after_pending_work() {
        let counter = Arc::new(Mutex::new(0));
        {
            let worker = DelegatedTaskWorker::new(8).unwrap();
            for _ in 0..5 {
                let counter = counter.clone();
                worker
                    .submit(vec![Box::new(move || *counter.lock().unwrap() += 1)])
                    .unwrap();
            }
        }
        assert_eq!(*counter.lock().unwrap(), 5);
    }
}
