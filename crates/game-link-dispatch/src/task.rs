//! One-shot tasks and the per-owner FIFO they wait in

use std::collections::VecDeque;

/// A one-shot unit of work run with exclusive access to its target.
///
/// Any `FnOnce(&mut T) + Send` closure is a task.
pub trait Task<T: ?Sized>: Send {
    /// Consume the task, running it against `object`
    fn run(self: Box<Self>, object: &mut T);
}

impl<T: ?Sized, F> Task<T> for F
where
    F: FnOnce(&mut T) + Send,
{
    fn run(self: Box<Self>, object: &mut T) {
        (*self)(object)
    }
}

/// A task as stored in a queue
pub type BoxedTask<T> = Box<dyn Task<T>>;

/// FIFO of pending tasks for one owner.
///
/// Once closed the queue refuses new tasks and hands them back to the caller,
/// so nothing can be left behind after the owner is gone.
pub(crate) struct TaskQueue<T> {
    tasks: VecDeque<BoxedTask<T>>,
    closed: bool,
}

impl<T> TaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            closed: false,
        }
    }

    /// Append a task. Returns the new depth, or the task if the queue is closed.
    pub(crate) fn push(&mut self, task: BoxedTask<T>) -> Result<usize, BoxedTask<T>> {
        if self.closed {
            return Err(task);
        }
        self.tasks.push_back(task);
        Ok(self.tasks.len())
    }

    pub(crate) fn pop(&mut self) -> Option<BoxedTask<T>> {
        self.tasks.pop_front()
    }

    /// Close the queue and take every task still pending
    pub(crate) fn close(&mut self) -> VecDeque<BoxedTask<T>> {
        self.closed = true;
        std::mem::take(&mut self.tasks)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
