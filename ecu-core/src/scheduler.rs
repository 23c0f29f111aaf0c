//! Cooperative priority task table.
//!
//! Tasks are plain `fn(&mut C)` pointers over a context owned by the caller, so
//! the table itself never allocates and never borrows node state. Each call to
//! [`TaskTable::run_once`] dispatches at most one task: the enabled, ready task
//! whose period has elapsed and whose priority value is lowest. Ties go to the
//! task that appears first in the table. Lower-priority tasks that stay overdue
//! while higher-priority work keeps becoming due are not run until the
//! higher-priority work goes quiet.

use heapless::Vec;

use crate::ticks::{Tick, ticks_since};

/// Task body invoked with the node context.
pub type TaskFn<C> = fn(&mut C);

/// Index of a registered task.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct TaskId(u8);

impl TaskId {
    /// Position of the task inside the table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Execution state of a task record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    Ready,
    Running,
    Waiting,
}

/// One scheduled task.
pub struct TaskRecord<C> {
    run: TaskFn<C>,
    /// Minimum ticks between two runs.
    pub period: Tick,
    /// Tick at which the task last started.
    pub last_run: Tick,
    /// Lower is more urgent.
    pub priority: u8,
    pub enabled: bool,
    pub state: RunState,
}

impl<C> TaskRecord<C> {
    const fn new(run: TaskFn<C>, period: Tick, priority: u8) -> Self {
        Self {
            run,
            period,
            last_run: 0,
            priority,
            enabled: true,
            state: RunState::Ready,
        }
    }

    fn is_candidate(&self, now: Tick) -> bool {
        self.enabled && self.state == RunState::Ready && ticks_since(now, self.last_run) >= self.period
    }
}

/// Fixed-capacity task table.
pub struct TaskTable<C, const N: usize> {
    tasks: Vec<TaskRecord<C>, N>,
}

impl<C, const N: usize> TaskTable<C, N> {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Appends a task. When the table is full the task is dropped and `None`
    /// is returned; nothing else signals the overflow.
    pub fn register(&mut self, run: TaskFn<C>, period: Tick, priority: u8) -> Option<TaskId> {
        let index = u8::try_from(self.tasks.len()).ok()?;
        self.tasks.push(TaskRecord::new(run, period, priority)).ok()?;
        Some(TaskId(index))
    }

    /// Reorders the table by ascending priority, keeping registration order
    /// among equal priorities.
    ///
    /// Task ids returned by [`register`](Self::register) refer to table
    /// positions, so they must be looked up again after sorting.
    pub fn sort_by_priority(&mut self) {
        for i in 1..self.tasks.len() {
            let mut j = i;
            while j > 0 && self.tasks[j - 1].priority > self.tasks[j].priority {
                self.tasks.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    /// Runs at most one due task and returns which one ran.
    pub fn run_once(&mut self, now: Tick, context: &mut C) -> Option<TaskId> {
        let mut selected: Option<usize> = None;
        for (index, task) in self.tasks.iter().enumerate() {
            if !task.is_candidate(now) {
                continue;
            }
            match selected {
                Some(best) if self.tasks[best].priority <= task.priority => {}
                _ => selected = Some(index),
            }
        }

        let index = selected?;
        let task = &mut self.tasks[index];
        task.state = RunState::Running;
        (task.run)(context);
        task.last_run = now;
        task.state = RunState::Ready;

        u8::try_from(index).ok().map(TaskId)
    }

    /// Finds the current position of the task running `run`.
    #[must_use]
    pub fn find(&self, run: TaskFn<C>) -> Option<TaskId> {
        self.tasks
            .iter()
            .position(|task| core::ptr::fn_addr_eq(task.run, run))
            .and_then(|index| u8::try_from(index).ok())
            .map(TaskId)
    }

    /// Allows the task to be dispatched again.
    pub fn enable(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.index()) {
            task.enabled = true;
        }
    }

    /// Excludes the task from dispatch until re-enabled.
    pub fn disable(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.index()) {
            task.enabled = false;
        }
    }

    /// Enables only `keep`, disabling every other task.
    pub fn isolate(&mut self, keep: TaskId) {
        for (index, task) in self.tasks.iter_mut().enumerate() {
            task.enabled = index == keep.index();
        }
    }

    /// Re-enables every task.
    pub fn enable_all(&mut self) {
        for task in &mut self.tasks {
            task.enabled = true;
        }
    }

    #[must_use]
    pub fn is_enabled(&self, id: TaskId) -> bool {
        self.tasks.get(id.index()).is_some_and(|task| task.enabled)
    }

    /// Returns the record at `id`.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&TaskRecord<C>> {
        self.tasks.get(id.index())
    }

    /// Iterates over the records in dispatch-scan order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord<C>> {
        self.tasks.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tasks.is_full()
    }
}

impl<C, const N: usize> Default for TaskTable<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        calls: heapless::Vec<u8, 16>,
    }

    fn first(trace: &mut Trace) {
        trace.calls.push(1).unwrap();
    }

    fn second(trace: &mut Trace) {
        trace.calls.push(2).unwrap();
    }

    fn third(trace: &mut Trace) {
        trace.calls.push(3).unwrap();
    }

    #[test]
    fn lowest_priority_value_wins_and_only_one_task_runs() {
        let mut table: TaskTable<Trace, 4> = TaskTable::new();
        table.register(second, 10, 2).unwrap();
        table.register(first, 10, 1).unwrap();
        let mut trace = Trace::default();

        let ran = table.run_once(10, &mut trace);

        assert_eq!(ran, Some(TaskId(1)));
        assert_eq!(trace.calls.as_slice(), &[1]);
    }

    #[test]
    fn ties_go_to_first_registered() {
        let mut table: TaskTable<Trace, 4> = TaskTable::new();
        table.register(third, 5, 1).unwrap();
        table.register(first, 5, 1).unwrap();
        let mut trace = Trace::default();

        table.run_once(5, &mut trace);
        assert_eq!(trace.calls.as_slice(), &[3]);
    }

    #[test]
    fn period_must_elapse_before_rerun() {
        let mut table: TaskTable<Trace, 2> = TaskTable::new();
        table.register(first, 100, 1).unwrap();
        let mut trace = Trace::default();

        assert!(table.run_once(100, &mut trace).is_some());
        assert!(table.run_once(150, &mut trace).is_none());
        assert!(table.run_once(200, &mut trace).is_some());
        assert_eq!(trace.calls.len(), 2);
        assert_eq!(table.get(TaskId(0)).unwrap().last_run, 200);
        assert_eq!(table.get(TaskId(0)).unwrap().state, RunState::Ready);
    }

    #[test]
    fn due_check_tolerates_tick_wraparound() {
        let mut table: TaskTable<Trace, 2> = TaskTable::new();
        table.register(first, 10, 1).unwrap();
        let mut trace = Trace::default();

        table.run_once(u32::MAX - 3, &mut trace);
        assert!(table.run_once(2, &mut trace).is_none());
        assert!(table.run_once(6, &mut trace).is_some());
    }

    #[test]
    fn registration_beyond_capacity_is_dropped() {
        let mut table: TaskTable<Trace, 2> = TaskTable::new();
        assert!(table.register(first, 1, 1).is_some());
        assert!(table.register(second, 1, 2).is_some());
        assert!(table.register(third, 1, 0).is_none());
        assert!(table.is_full());
        assert_eq!(table.len(), 2);
        assert_eq!(table.find(third), None);
    }

    #[test]
    fn sort_is_stable_and_ascending() {
        let mut table: TaskTable<Trace, 4> = TaskTable::new();
        table.register(third, 1, 3).unwrap();
        table.register(first, 1, 1).unwrap();
        table.register(second, 1, 1).unwrap();

        table.sort_by_priority();

        let order: heapless::Vec<u8, 4> = table.iter().map(|task| task.priority).collect();
        assert_eq!(order.as_slice(), &[1, 1, 3]);
        assert_eq!(table.find(first), Some(TaskId(0)));
        assert_eq!(table.find(second), Some(TaskId(1)));
        assert_eq!(table.find(third), Some(TaskId(2)));
    }

    #[test]
    fn disabled_tasks_are_skipped_and_overdue_work_starves() {
        let mut table: TaskTable<Trace, 4> = TaskTable::new();
        let urgent = table.register(first, 1, 1).unwrap();
        table.register(second, 1, 2).unwrap();
        let mut trace = Trace::default();

        for now in 1..=3 {
            table.run_once(now, &mut trace);
        }
        assert_eq!(trace.calls.as_slice(), &[1, 1, 1]);

        table.disable(urgent);
        assert!(!table.is_enabled(urgent));
        table.run_once(4, &mut trace);
        assert_eq!(trace.calls.last(), Some(&2));

        table.isolate(urgent);
        table.run_once(5, &mut trace);
        assert_eq!(trace.calls.last(), Some(&1));
        table.enable_all();
        assert!(table.iter().all(|task| task.enabled));
    }
}
