//! Job model and per-run worklist.
//!
//! A run moves through four states:
//!
//! ```text
//! Initial --seed--> Running --begin_file_sweep--> FileSweep --terminate--> Terminal
//!                      \________________________terminate_________________/
//! ```
//!
//! Top-level declaration jobs run in source order. Jobs discovered while a
//! job runs are appended behind everything already queued, in discovery
//! order. Each declaration is scheduled at most once per run.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, trace};

use crate::ast::DeclId;
use crate::error::IndexerError;
use crate::source::FileId;

/// One unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Visit a declaration's subtree
    Decl(DeclId),
    /// Emit file-scoped facts once every declaration has been visited
    FileSweep(FileId),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Decl(decl) => write!(f, "decl job {}", decl.0),
            Job::FileSweep(file) => write!(f, "file sweep {}", file.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Initial,
    Running,
    FileSweep,
    Terminal,
}

/// FIFO worklist for one translation-unit run.
#[derive(Debug)]
pub struct Worklist {
    state: SchedulerState,
    queue: VecDeque<Job>,
    enqueued_decls: HashSet<DeclId>,
    enqueued_files: HashSet<FileId>,
    started: usize,
}

impl Default for Worklist {
    fn default() -> Self {
        Self::new()
    }
}

impl Worklist {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Initial,
            queue: VecDeque::new(),
            enqueued_decls: HashSet::new(),
            enqueued_files: HashSet::new(),
            started: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Jobs handed out by [`dequeue`](Self::dequeue) so far.
    pub fn started(&self) -> usize {
        self.started
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue one job per top-level declaration and start running.
    pub fn seed(&mut self, decls: impl IntoIterator<Item = DeclId>) -> Result<usize, IndexerError> {
        if self.state != SchedulerState::Initial {
            return Err(IndexerError::InvalidTree(format!(
                "worklist seeded in state {:?}",
                self.state
            )));
        }
        self.state = SchedulerState::Running;
        let mut seeded = 0;
        for decl in decls {
            if self.enqueue(Job::Decl(decl))? {
                seeded += 1;
            }
        }
        debug!(seeded, "seeded worklist");
        Ok(seeded)
    }

    /// Append `job` unless it was already scheduled this run.
    ///
    /// Returns whether the job was queued; fails once the worklist is
    /// terminal.
    pub fn enqueue(&mut self, job: Job) -> Result<bool, IndexerError> {
        if self.state == SchedulerState::Terminal {
            return Err(IndexerError::WorklistClosed(job.to_string()));
        }
        let fresh = match job {
            Job::Decl(decl) => self.enqueued_decls.insert(decl),
            Job::FileSweep(file) => self.enqueued_files.insert(file),
        };
        if fresh {
            trace!(%job, "enqueued");
            self.queue.push_back(job);
        }
        Ok(fresh)
    }

    /// Take the next job, counting it as started.
    pub fn dequeue(&mut self) -> Option<Job> {
        if self.state == SchedulerState::Terminal {
            return None;
        }
        let job = self.queue.pop_front()?;
        self.started += 1;
        Some(job)
    }

    /// Enter the file-sweep phase with one job per claimed file.
    ///
    /// Any declaration jobs still queued are dropped.
    pub fn begin_file_sweep(
        &mut self,
        files: impl IntoIterator<Item = FileId>,
    ) -> Result<usize, IndexerError> {
        if self.state == SchedulerState::Terminal {
            return Err(IndexerError::WorklistClosed("file sweep".to_string()));
        }
        self.queue.clear();
        self.state = SchedulerState::FileSweep;
        let mut queued = 0;
        for file in files {
            if self.enqueue(Job::FileSweep(file))? {
                queued += 1;
            }
        }
        debug!(files = queued, "starting file sweep");
        Ok(queued)
    }

    /// Discard the queue and refuse further jobs. Returns how many queued
    /// jobs were dropped.
    pub fn terminate(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.state = SchedulerState::Terminal;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_with_discovered_jobs_last() {
        let mut worklist = Worklist::new();
        assert_eq!(worklist.seed([DeclId(1), DeclId(2)]).unwrap(), 2);
        assert_eq!(worklist.state(), SchedulerState::Running);

        assert_eq!(worklist.dequeue(), Some(Job::Decl(DeclId(1))));
        // Discovered while running decl 1.
        assert!(worklist.enqueue(Job::Decl(DeclId(7))).unwrap());
        assert!(worklist.enqueue(Job::Decl(DeclId(5))).unwrap());
        assert_eq!(worklist.dequeue(), Some(Job::Decl(DeclId(2))));
        assert_eq!(worklist.dequeue(), Some(Job::Decl(DeclId(7))));
        assert_eq!(worklist.dequeue(), Some(Job::Decl(DeclId(5))));
        assert_eq!(worklist.dequeue(), None);
        assert_eq!(worklist.started(), 4);
    }

    #[test]
    fn test_decl_jobs_are_deduplicated() {
        let mut worklist = Worklist::new();
        worklist.seed([DeclId(1), DeclId(1)]).unwrap();
        assert_eq!(worklist.len(), 1);
        worklist.dequeue();
        assert!(!worklist.enqueue(Job::Decl(DeclId(1))).unwrap());
        assert!(worklist.is_empty());
    }

    #[test]
    fn test_file_sweep_then_terminal() {
        let mut worklist = Worklist::new();
        worklist.seed([DeclId(1)]).unwrap();
        assert_eq!(worklist.begin_file_sweep([FileId(0), FileId(2)]).unwrap(), 2);
        assert_eq!(worklist.state(), SchedulerState::FileSweep);
        assert_eq!(worklist.dequeue(), Some(Job::FileSweep(FileId(0))));

        assert_eq!(worklist.terminate(), 1);
        assert_eq!(worklist.dequeue(), None);
        let err = worklist.enqueue(Job::Decl(DeclId(3))).unwrap_err();
        assert!(matches!(err, IndexerError::WorklistClosed(_)));
        assert!(worklist.begin_file_sweep([FileId(0)]).is_err());
    }

    #[test]
    fn test_seed_only_once() {
        let mut worklist = Worklist::new();
        worklist.seed(Vec::new()).unwrap();
        assert!(worklist.seed([DeclId(1)]).is_err());
    }
}
