use std::collections::{HashSet, VecDeque};
use std::process::Child;
use std::sync::mpsc::channel;

use threadpool::ThreadPool;

use super::interrupt::Interrupt;
use super::Result;

/// Aggregate verdict over one engine run.
///
/// `Interrupted` is distinct from `Failed`: the former means admission was
/// stopped by the cancellation token, the latter that at least one child
/// exited unsuccessfully. In both cases every in-flight child has been
/// waited for by the time the engine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Interrupted,
}

impl Outcome {
    pub fn succeeded(self) -> bool {
        self == Outcome::Completed
    }
}

/// What one finished child reported back.
///
/// `lines` is only populated when the task spawned its child with a piped
/// stdout; status-style tasks see an empty capture.
#[derive(Debug, Clone)]
pub struct Completion {
    pub success: bool,
    pub lines: Vec<String>,
}

/// Run one child process per item with bounded parallelism.
///
/// Contracts:
/// - items are admitted in their natural order, except that an item whose
///   serialisation key is busy is passed over until the key frees up;
/// - at most one child per key is alive at any instant;
/// - `cap` bounds the global in-flight count when given;
/// - a failed child never stops the run: remaining work is drained so the
///   diagnostics cover the whole fleet;
/// - when the token trips, no further items are admitted, but running
///   children are waited for, never signalled;
/// - `complete` runs on the calling thread, once per admitted item.
pub fn run<T, K, S, C>(
    items: &[T],
    cap: Option<usize>,
    interrupt: &Interrupt,
    key: K,
    spawn: S,
    mut complete: C,
) -> Outcome
where
    K: Fn(&T) -> String,
    S: Fn(&T) -> Result<Child>,
    C: FnMut(&T, &Completion),
{
    if items.is_empty() {
        return Outcome::Completed;
    }

    let limit = cap.unwrap_or(items.len()).max(1);
    let pool = ThreadPool::new(limit.min(items.len()));
    let (tx, rx) = channel();

    let mut pending: VecDeque<usize> = (0..items.len()).collect();
    let mut busy: HashSet<String> = HashSet::new();
    let mut in_flight = 0usize;
    let mut success = true;
    let mut interrupted = false;

    loop {
        if !interrupted && interrupt.is_set() {
            interrupted = true;
            if !pending.is_empty() {
                eprintln!("[coordinator]: Interrupted, not admitting any further tasks");
                pending.clear();
            }
        }

        while !pending.is_empty() && in_flight < limit {
            let slot = pending
                .iter()
                .position(|&i| !busy.contains(&key(&items[i])));
            let idx = match slot {
                Some(pos) => match pending.remove(pos) {
                    Some(idx) => idx,
                    None => break,
                },
                None => break,
            };

            match spawn(&items[idx]) {
                Ok(child) => {
                    busy.insert(key(&items[idx]));
                    let tx = tx.clone();
                    pool.execute(move || {
                        let _ = tx.send((idx, reap(child)));
                    });
                    in_flight += 1;
                }
                Err(e) => {
                    eprintln!("[coordinator]: Cannot fork task: {}", e);
                    success = false;
                    complete(
                        &items[idx],
                        &Completion {
                            success: false,
                            lines: Vec::new(),
                        },
                    );
                }
            }
        }

        if in_flight == 0 {
            if pending.is_empty() {
                break;
            }
            continue;
        }

        let (idx, completion) = match rx.recv() {
            Ok(done) => done,
            Err(_) => break,
        };
        in_flight -= 1;
        busy.remove(&key(&items[idx]));
        if !completion.success {
            success = false;
        }
        complete(&items[idx], &completion);
    }

    if interrupted {
        Outcome::Interrupted
    } else if success {
        Outcome::Completed
    } else {
        Outcome::Failed
    }
}

/// Wait for a child and fold its exit into a `Completion`.
///
/// Capture only happens when the spawner piped stdout; an inherited stdout
/// yields an empty buffer from `wait_with_output`.
fn reap(child: Child) -> Completion {
    match child.wait_with_output() {
        Ok(output) => Completion {
            success: output.status.success(),
            lines: String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        },
        Err(_) => Completion {
            success: false,
            lines: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::{Command, Stdio};

    fn sh(script: String) -> Result<Child> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        Ok(cmd.spawn()?)
    }

    #[test]
    fn drains_everything_and_reports_success() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut done = 0;
        let outcome = run(
            &items,
            None,
            &Interrupt::new(),
            |i| i.clone(),
            |_| sh("true".to_string()),
            |_, c| {
                assert!(c.success);
                done += 1;
            },
        );
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(done, 3);
    }

    #[test]
    fn one_failure_flips_the_outcome_but_not_the_drain() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut done = 0;
        let outcome = run(
            &items,
            None,
            &Interrupt::new(),
            |i| i.clone(),
            |i| sh(if i == "b" { "false".to_string() } else { "true".to_string() }),
            |_, _| done += 1,
        );
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(done, 3);
    }

    #[test]
    fn captures_stdout_lines_when_piped() {
        let items = vec!["x".to_string()];
        let mut seen = Vec::new();
        let outcome = run(
            &items,
            None,
            &Interrupt::new(),
            |i| i.clone(),
            |_| {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg("printf 'one\\ntwo\\n'").stdout(Stdio::piped());
                Ok(cmd.spawn()?)
            },
            |_, c| seen = c.lines.clone(),
        );
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn tripped_token_admits_nothing() {
        let token = Interrupt::new();
        token.trip();
        let items = vec!["a".to_string()];
        let mut done = 0;
        let outcome = run(&items, None, &token, |i| i.clone(), |_| sh("true".to_string()), |_, _| {
            done += 1
        });
        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(done, 0);
    }

    #[test]
    fn same_key_tasks_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace");
        fs::write(&log, "").unwrap();

        let items = vec!["t1".to_string(), "t1".to_string(), "t1".to_string()];
        let outcome = run(
            &items,
            None,
            &Interrupt::new(),
            |i| i.clone(),
            |_| {
                sh(format!(
                    "echo start >> {p}; sleep 0.15; echo end >> {p}",
                    p = log.display()
                ))
            },
            |_, _| {},
        );
        assert_eq!(outcome, Outcome::Completed);

        let trace = fs::read_to_string(&log).unwrap();
        let events: Vec<&str> = trace.lines().collect();
        assert_eq!(events.len(), 6);
        for pair in events.chunks(2) {
            assert_eq!(pair, ["start", "end"]);
        }
    }

    #[test]
    fn the_transfer_cap_bounds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace");
        fs::write(&log, "").unwrap();

        let items: Vec<String> = (0..4).map(|i| format!("t{}", i)).collect();
        let outcome = run(
            &items,
            Some(1),
            &Interrupt::new(),
            |i| i.clone(),
            |_| {
                sh(format!(
                    "echo start >> {p}; sleep 0.1; echo end >> {p}",
                    p = log.display()
                ))
            },
            |_, _| {},
        );
        assert_eq!(outcome, Outcome::Completed);

        let trace = fs::read_to_string(&log).unwrap();
        let mut live = 0;
        for line in trace.lines() {
            match line {
                "start" => {
                    live += 1;
                    assert!(live <= 1);
                }
                _ => live -= 1,
            }
        }
    }
}
