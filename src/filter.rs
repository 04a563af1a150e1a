//! Event filtering for the counting aggregator
//!
//! strace-style expressions, one clause per category, clauses joined by `;`
//! and OR-ed together:
//! - Tracepoint kinds: `kind=sched_wakeup,irq_entry`
//! - Syscalls by name, number or class: `syscall=epoll_pwait,read`,
//!   `syscall=poll`, `syscall=450`
//! - Interrupts by number or handler name: `irq=123,fts_touch`
//! - Wakeups of named threads: `wakeup=InputDispatcher,InputReader`
//! - Tracepoints by buffer token: `tracepoint=esm_deliver,sys_enter`
//!
//! `kind=esm` matches every `esm*` tracepoint.
//!
//! `irq=` matches `irq_handler_entry` only, so each interrupt counts once.

use crate::syscalls::syscall_number;
use crate::trace_event::{EventPayload, TraceEvent, TracepointKind};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid filter clause: '{0}'. Expected kind=, syscall=, irq=, wakeup= or tracepoint=")]
    InvalidClause(String),

    #[error("Unknown tracepoint kind: '{0}'")]
    UnknownKind(String),

    #[error("Unknown syscall: '{0}' (use a number for syscalls outside the table)")]
    UnknownSyscall(String),

    #[error("Empty value list in clause '{0}'")]
    EmptyList(String),
}

#[derive(Debug, Clone)]
enum Clause {
    Kind(HashSet<TracepointKind>),
    Syscall(HashSet<i64>),
    Irq {
        numbers: HashSet<u32>,
        names: HashSet<String>,
    },
    Wakeup(HashSet<String>),
    Tracepoint(HashSet<String>),
}

impl Clause {
    fn matches(&self, event: &TraceEvent) -> bool {
        match (self, &event.payload) {
            (Clause::Kind(kinds), _) => kinds.contains(&event.kind()),
            (Clause::Tracepoint(names), _) => names.contains(event.tracepoint()),
            (Clause::Syscall(nrs), EventPayload::SysEnter { syscall_nr }) => {
                nrs.contains(syscall_nr)
            }
            (Clause::Irq { numbers, names }, EventPayload::IrqEntry { irq, name }) => {
                numbers.contains(irq) || names.contains(name)
            }
            (Clause::Wakeup(comms), EventPayload::SchedWakeup { woken_comm, .. }) => {
                comms.contains(woken_comm)
            }
            _ => false,
        }
    }
}

/// Filter that determines which events are counted
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Empty = every event matches
    clauses: Vec<Clause>,
    expr: String,
}

impl EventFilter {
    /// Create a filter that matches all events
    pub fn all() -> Self {
        Self {
            clauses: Vec::new(),
            expr: "all".to_string(),
        }
    }

    /// Parse a filter expression like "syscall=poll;irq=fts_touch"
    pub fn from_expr(expr: &str) -> Result<Self, FilterError> {
        let mut clauses = Vec::new();

        for clause in expr.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let Some((category, list)) = clause.split_once('=') else {
                return Err(FilterError::InvalidClause(clause.to_string()));
            };
            let items: Vec<&str> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if items.is_empty() {
                return Err(FilterError::EmptyList(clause.to_string()));
            }

            clauses.push(match category.trim() {
                "kind" => Self::kind_clause(&items)?,
                "syscall" | "trace" => Self::syscall_clause(&items)?,
                "irq" => Self::irq_clause(&items),
                "wakeup" => Clause::Wakeup(items.iter().map(|s| s.to_string()).collect()),
                "tracepoint" => Clause::Tracepoint(items.iter().map(|s| s.to_string()).collect()),
                _ => return Err(FilterError::InvalidClause(clause.to_string())),
            });
        }

        if clauses.is_empty() {
            return Err(FilterError::InvalidClause(expr.to_string()));
        }

        Ok(Self {
            clauses,
            expr: expr.trim().to_string(),
        })
    }

    fn kind_clause(items: &[&str]) -> Result<Clause, FilterError> {
        items
            .iter()
            .map(|name| {
                TracepointKind::from_name(name).ok_or_else(|| FilterError::UnknownKind(name.to_string()))
            })
            .collect::<Result<HashSet<_>, _>>()
            .map(Clause::Kind)
    }

    fn syscall_clause(items: &[&str]) -> Result<Clause, FilterError> {
        let mut nrs = HashSet::new();

        for part in items {
            match *part {
                "poll" => {
                    // Blocking waits used by the epoll-based delivery path
                    nrs.extend(
                        ["epoll_pwait", "epoll_pwait2", "ppoll", "pselect6"]
                            .iter()
                            .filter_map(|s| syscall_number(s)),
                    );
                }
                "io" => {
                    nrs.extend(
                        ["read", "write", "readv", "writev"]
                            .iter()
                            .filter_map(|s| syscall_number(s)),
                    );
                }
                "epoll" => {
                    nrs.extend(
                        ["epoll_create1", "epoll_ctl", "epoll_pwait", "epoll_pwait2"]
                            .iter()
                            .filter_map(|s| syscall_number(s)),
                    );
                }
                _ => {
                    let nr = match part.parse::<i64>() {
                        Ok(nr) => nr,
                        Err(_) => syscall_number(part)
                            .ok_or_else(|| FilterError::UnknownSyscall(part.to_string()))?,
                    };
                    nrs.insert(nr);
                }
            }
        }

        Ok(Clause::Syscall(nrs))
    }

    fn irq_clause(items: &[&str]) -> Clause {
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();
        for part in items {
            match part.parse::<u32>() {
                Ok(n) => {
                    numbers.insert(n);
                }
                Err(_) => {
                    names.insert(part.to_string());
                }
            }
        }
        Clause::Irq { numbers, names }
    }

    /// Check if an event should be counted
    pub fn matches(&self, event: &TraceEvent) -> bool {
        self.clauses.is_empty() || self.clauses.iter().any(|c| c.matches(event))
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}
