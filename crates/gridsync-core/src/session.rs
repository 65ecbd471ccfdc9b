//! Collaboration scripts.
//!
//! A script drives several peers sharing one [`Network`]:
//!
//! ```text
//! # comment
//! join alice 3 3
//! set alice A1 10
//! sync
//! join bob 1 1
//! expect bob A1 10
//! clear bob A1
//! show alice
//! leave bob
//! ```
//!
//! `set` and `expect` take the rest of the line verbatim as cell text or
//! expected display value. The other commands accept a trailing `# ...`
//! comment.

use gridsync_engine::engine::CellRef;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::export::render_markdown;
use crate::map::{Network, Replica};
use crate::workbook::SharedWorkbook;

/// One script command.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Join { peer: String, rows: usize, cols: usize },
    Set { peer: String, cell: CellRef, text: String },
    Clear { peer: String, cell: CellRef },
    Sync,
    Show { peer: String },
    Expect { peer: String, cell: CellRef, expected: String },
    Leave { peer: String },
}

/// Parse script text into steps.
pub fn parse_script(content: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        steps.push(parse_step(line, line_num + 1)?);
    }
    Ok(steps)
}

fn parse_step(line: &str, line_num: usize) -> Result<Step> {
    let parse_err = |message: String| SyncError::Parse {
        line: line_num,
        message,
    };
    let (command, rest) = split_word(line);

    match command {
        "set" | "expect" => {
            let (peer, rest) = split_word(rest);
            let (cell, text) = split_word(rest);
            if peer.is_empty() || cell.is_empty() {
                return Err(parse_err(format!("Expected '{} PEER CELL VALUE'", command)));
            }
            let cell = parse_cell(cell, line_num)?;
            let peer = peer.to_string();
            let text = text.to_string();
            Ok(if command == "set" {
                Step::Set { peer, cell, text }
            } else {
                Step::Expect {
                    peer,
                    cell,
                    expected: text,
                }
            })
        }
        _ => {
            let args: Vec<&str> = rest
                .split_whitespace()
                .take_while(|word| !word.starts_with('#'))
                .collect();
            match (command, args.as_slice()) {
                ("join", [peer, rows, cols]) => Ok(Step::Join {
                    peer: peer.to_string(),
                    rows: parse_count(rows, line_num)?,
                    cols: parse_count(cols, line_num)?,
                }),
                ("clear", [peer, cell]) => Ok(Step::Clear {
                    peer: peer.to_string(),
                    cell: parse_cell(cell, line_num)?,
                }),
                ("sync", []) => Ok(Step::Sync),
                ("show", [peer]) => Ok(Step::Show {
                    peer: peer.to_string(),
                }),
                ("leave", [peer]) => Ok(Step::Leave {
                    peer: peer.to_string(),
                }),
                ("join" | "clear" | "sync" | "show" | "leave", _) => Err(parse_err(format!(
                    "Wrong number of arguments for '{}'",
                    command
                ))),
                _ => Err(parse_err(format!("Unknown command: {}", command))),
            }
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

fn parse_cell(s: &str, line_num: usize) -> Result<CellRef> {
    CellRef::from_str(s).ok_or_else(|| SyncError::Parse {
        line: line_num,
        message: format!("Invalid cell reference: {}", s),
    })
}

fn parse_count(s: &str, line_num: usize) -> Result<usize> {
    s.parse::<usize>().map_err(|_| SyncError::Parse {
        line: line_num,
        message: format!("Invalid dimension: {}", s),
    })
}

/// Options that change how a script is run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Deliver pending writes after every step.
    pub auto_sync: bool,
}

/// A set of named peers sharing one network.
pub struct Session {
    network: Network,
    peers: BTreeMap<String, SharedWorkbook<Replica>>,
    options: SessionOptions,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Session {
            network: Network::new(),
            peers: BTreeMap::new(),
            options,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn peer(&self, name: &str) -> Result<&SharedWorkbook<Replica>> {
        self.peers
            .get(name)
            .ok_or_else(|| SyncError::UnknownPeer(name.to_string()))
    }

    /// Run `steps` in order, returning the output of every `show`.
    ///
    /// Stops at the first failing step. A fault raised while a peer applied
    /// a remote change fails the step that delivered it.
    pub fn run(&mut self, steps: &[Step]) -> Result<Vec<String>> {
        let mut output = Vec::new();
        for step in steps {
            if let Some(block) = self.step(step)? {
                output.push(block);
            }
            if self.options.auto_sync {
                self.network.flush();
            }
            self.check_faults()?;
        }
        Ok(output)
    }

    fn step(&mut self, step: &Step) -> Result<Option<String>> {
        debug!(?step, "session step");
        match step {
            Step::Join { peer, rows, cols } => {
                if self.peers.contains_key(peer) {
                    return Err(SyncError::DuplicatePeer(peer.clone()));
                }
                let workbook = SharedWorkbook::new(self.network.join(), *rows, *cols, None)?;
                let dims = workbook.dimensions();
                info!(
                    peer = %peer,
                    rows = dims.num_rows,
                    cols = dims.num_cols,
                    existing = workbook.state().existing,
                    "peer joined"
                );
                self.peers.insert(peer.clone(), workbook);
            }
            Step::Set { peer, cell, text } => {
                self.peer(peer)?.set_cell_text(cell.row, cell.col, text)?;
            }
            Step::Clear { peer, cell } => {
                self.peer(peer)?.set_cell_text(cell.row, cell.col, "")?;
            }
            Step::Sync => {
                let delivered = self.network.flush();
                debug!(delivered, "sync");
            }
            Step::Show { peer } => {
                let grid = self.peer(peer)?.display_grid();
                return Ok(Some(render_markdown(peer, &grid)));
            }
            Step::Expect {
                peer,
                cell,
                expected,
            } => {
                let actual = self.peer(peer)?.display(cell.row, cell.col)?;
                if actual != *expected {
                    return Err(SyncError::Expectation {
                        peer: peer.clone(),
                        cell: cell.to_string(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            Step::Leave { peer } => {
                if self.peers.remove(peer).is_none() {
                    return Err(SyncError::UnknownPeer(peer.clone()));
                }
                info!(peer = %peer, "peer left");
            }
        }
        Ok(None)
    }

    fn check_faults(&self) -> Result<()> {
        for workbook in self.peers.values() {
            if let Some(fault) = workbook.take_faults().into_iter().next() {
                return Err(fault);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{SharedMap, Value};

    fn run(script: &str, options: SessionOptions) -> Result<Vec<String>> {
        let steps = parse_script(script)?;
        Session::new(options).run(&steps)
    }

    #[test]
    fn test_parse_commands() {
        let steps = parse_script(
            "# demo\njoin alice 2 3   # first\nset alice B1 =A1 + 1\n\nsync\nexpect alice B1 2\n",
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Join {
                    peer: "alice".to_string(),
                    rows: 2,
                    cols: 3
                },
                Step::Set {
                    peer: "alice".to_string(),
                    cell: CellRef::new(0, 1),
                    text: "=A1 + 1".to_string()
                },
                Step::Sync,
                Step::Expect {
                    peer: "alice".to_string(),
                    cell: CellRef::new(0, 1),
                    expected: "2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_set_keeps_hash_in_text() {
        let steps = parse_script("set a A1 \"#1\"").unwrap();
        assert_eq!(
            steps,
            vec![Step::Set {
                peer: "a".to_string(),
                cell: CellRef::new(0, 0),
                text: "\"#1\"".to_string()
            }]
        );
    }

    #[test]
    fn test_set_without_text_is_empty_edit() {
        let steps = parse_script("set a A1").unwrap();
        assert!(matches!(&steps[0], Step::Set { text, .. } if text.is_empty()));
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        assert_eq!(
            parse_script("sync\nfrobnicate x").unwrap_err(),
            SyncError::Parse {
                line: 2,
                message: "Unknown command: frobnicate".to_string()
            }
        );
        assert!(matches!(
            parse_script("join a 2"),
            Err(SyncError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_script("set a 1A x"),
            Err(SyncError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_script("join a two 2"),
            Err(SyncError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_late_joiner_sees_synced_edits() {
        let script = "join alice 2 2\nset alice A1 10\nset alice B1 =A1 * 2\nsync\njoin bob 9 9\nexpect bob B1 20\n";
        assert!(run(script, SessionOptions::default()).is_ok());
    }

    #[test]
    fn test_unsynced_edit_not_visible() {
        let script = "join alice 1 1\njoin bob 1 1\nset alice A1 5\nexpect bob A1 5\n";
        assert_eq!(
            run(script, SessionOptions::default()).unwrap_err(),
            SyncError::Expectation {
                peer: "bob".to_string(),
                cell: "A1".to_string(),
                expected: "5".to_string(),
                actual: String::new()
            }
        );
        assert!(run(script, SessionOptions { auto_sync: true }).is_ok());
    }

    #[test]
    fn test_clear_propagates() {
        let script =
            "join a 1 1\njoin b 1 1\nset a A1 x\nsync\nexpect b A1 x\nclear b A1\nsync\nexpect a A1 \n";
        assert!(run(script, SessionOptions::default()).is_ok());
    }

    #[test]
    fn test_show_renders_markdown() {
        let out = run("join a 1 2\nset a A1 1\nset a B1 =A1+1\nshow a\n", SessionOptions::default())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("## a\n"));
        assert!(out[0].contains("| 1 | 1 | 2 |"));
    }

    #[test]
    fn test_unknown_and_duplicate_peers() {
        assert_eq!(
            run("show ghost", SessionOptions::default()).unwrap_err(),
            SyncError::UnknownPeer("ghost".to_string())
        );
        assert_eq!(
            run("join a 1 1\njoin a 1 1", SessionOptions::default()).unwrap_err(),
            SyncError::DuplicatePeer("a".to_string())
        );
        assert_eq!(
            run("join a 1 1\nleave a\nset a A1 x", SessionOptions::default()).unwrap_err(),
            SyncError::UnknownPeer("a".to_string())
        );
    }

    #[test]
    fn test_router_fault_fails_the_delivering_step() {
        let mut session = Session::new(SessionOptions::default());
        session.run(&parse_script("join a 1 1\nsync").unwrap()).unwrap();

        let rogue = session.network().join();
        rogue.set("A1", Value::from("x"));
        assert_eq!(
            session.run(&[Step::Sync]).unwrap_err(),
            SyncError::MalformedKey {
                key: "A1".to_string()
            }
        );
        assert!(session.run(&[Step::Sync]).is_ok());
    }

    #[test]
    fn test_oversized_join_fails() {
        assert!(matches!(
            run("join a 99999999999 99999999999\nshow a", SessionOptions::default()),
            Err(SyncError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_leave_detaches_peer() {
        let mut session = Session::new(SessionOptions::default());
        let steps = parse_script("join a 1 1\njoin b 1 1\nleave b\nset a A1 x\nsync").unwrap();
        session.run(&steps).unwrap();
        assert!(session.peer("b").is_err());
        assert_eq!(session.peer("a").unwrap().cell_text(0, 0).unwrap(), "x");
        assert_eq!(session.network().replica_count(), 1);
    }
}
