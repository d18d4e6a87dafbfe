use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::task::{Task, TaskId, TaskStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The queue was empty; the task went straight to the worker.
    Started,
    /// 1-indexed position, counting the active task.
    Queued { position: usize },
}

/// FIFO of submissions. The head is the only task that may be active; it is
/// handed to the single worker through the activation channel, and only
/// `enqueue` onto an empty queue or `complete` of the head do so.
pub struct TaskQueue {
    queue: Mutex<VecDeque<Task>>,
    activations: Sender<Task>,
    next_id: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> (Self, Receiver<Task>) {
        let (tx, rx) = mpsc::channel();
        let queue = TaskQueue {
            queue: Mutex::new(VecDeque::new()),
            activations: tx,
            next_id: AtomicU64::new(1),
        };
        (queue, rx)
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        // every mutation is a single push/pop/assign, so the data is intact
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, task: Task) -> Admission {
        let mut q = self.lock();
        let was_empty = q.is_empty();
        debug!(task = %task.id, file = %task.attachment.file_name, "enqueued");
        q.push_back(task);
        if was_empty {
            if let Some(head) = q.front() {
                self.activate(head.clone());
            }
            Admission::Started
        } else {
            Admission::Queued { position: q.len() }
        }
    }

    /// Removes the finished head and activates the next one, if any.
    pub fn complete(&self, id: TaskId) -> Option<Task> {
        let mut q = self.lock();
        match q.front() {
            Some(head) if head.id == id => (),
            Some(head) => {
                error!(task = %id, head = %head.id, "completion for a task that is not active");
                return None;
            },
            None => {
                error!(task = %id, "completion on an empty queue");
                return None;
            },
        }
        let finished = q.pop_front();
        if let Some(next) = q.front() {
            self.activate(next.clone());
        }
        finished
    }

    /// Status changes are only accepted for the head, and a finished head
    /// keeps its final status.
    pub fn set_status(&self, id: TaskId, status: TaskStatus) -> bool {
        let mut q = self.lock();
        match q.front_mut() {
            Some(head) if head.id == id && head.status.is_terminal() && head.status != status => {
                warn!(task = %id, from = ?head.status, to = ?status, "task already finished");
                false
            },
            Some(head) if head.id == id => {
                head.status = status;
                true
            },
            _ => {
                warn!(task = %id, status = ?status, "status change for a task that is not active");
                false
            },
        }
    }

    pub fn peek_all(&self) -> Vec<Task> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn activate(&self, task: Task) {
        debug!(task = %task.id, "activating");
        if self.activations.send(task).is_err() {
            warn!("worker is gone; task stays queued");
        }
    }
}

/// Queue listing for the status command: one file name per line, 1-indexed.
pub fn render_queue(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return String::from("Queue is empty");
    }
    tasks.iter()
        .enumerate()
        .map(|(i, task)| format!("{}. {}", i + 1, task.attachment.file_name))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::TryRecvError;
    use crate::task::tests::task;

    #[test]
    fn test_first_enqueue_activates() {
        let (queue, rx) = TaskQueue::new();
        assert_eq!(queue.enqueue(task(1, "a.mkv")), Admission::Started);
        assert_eq!(rx.try_recv().unwrap().id, TaskId(1));
        assert_eq!(queue.enqueue(task(2, "b.mkv")), Admission::Queued { position: 2 });
        assert_eq!(queue.enqueue(task(3, "c.mkv")), Admission::Queued { position: 3 });
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_complete_advances_in_order() {
        let (queue, rx) = TaskQueue::new();
        for i in 1..=4 {
            queue.enqueue(task(i, &format!("{}.mkv", i)));
        }
        let mut processed = vec![];
        while let Ok(active) = rx.try_recv() {
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
            processed.push(active.id.0);
            assert_eq!(queue.complete(active.id).map(|t| t.id), Some(active.id));
        }
        assert_eq!(processed, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_complete_rejects_non_head() {
        let (queue, _rx) = TaskQueue::new();
        queue.enqueue(task(1, "a.mkv"));
        queue.enqueue(task(2, "b.mkv"));
        assert!(queue.complete(TaskId(2)).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_only_head_becomes_active() {
        let (queue, _rx) = TaskQueue::new();
        queue.enqueue(task(1, "a.mkv"));
        queue.enqueue(task(2, "b.mkv"));
        assert!(queue.set_status(TaskId(1), TaskStatus::Downloading));
        assert!(!queue.set_status(TaskId(2), TaskStatus::Downloading));
        let active = queue.peek_all().iter().filter(|t| t.status.is_active()).count();
        assert_eq!(active, 1);
    }

    #[test]
    fn test_finished_status_is_final() {
        let (queue, _rx) = TaskQueue::new();
        queue.enqueue(task(1, "a.mkv"));
        assert!(queue.set_status(TaskId(1), TaskStatus::Uploading));
        assert!(queue.set_status(TaskId(1), TaskStatus::Failed));
        assert!(!queue.set_status(TaskId(1), TaskStatus::Completed));
        assert!(!queue.set_status(TaskId(1), TaskStatus::Downloading));
        assert_eq!(queue.peek_all()[0].status, TaskStatus::Failed);
    }

    #[test]
    fn test_enqueue_after_drain_activates_again() {
        let (queue, rx) = TaskQueue::new();
        queue.enqueue(task(1, "a.mkv"));
        let first = rx.try_recv().unwrap();
        queue.complete(first.id);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(queue.enqueue(task(2, "b.mkv")), Admission::Started);
        assert_eq!(rx.try_recv().unwrap().id, TaskId(2));
    }

    #[test]
    fn test_render_queue() {
        assert_eq!(render_queue(&[]), "Queue is empty");
        assert_eq!(render_queue(&[task(1, "a.mkv"), task(2, "b.mp4")]), "1. a.mkv\n2. b.mp4");
    }

    #[test]
    fn test_ids_are_sequential() {
        let (queue, _rx) = TaskQueue::new();
        assert_eq!(queue.next_id(), TaskId(1));
        assert_eq!(queue.next_id(), TaskId(2));
    }
}
