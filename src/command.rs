// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{NodeError, NodeId};
use std::str::FromStr;

/// A line typed at the console. Anything not starting with `/` is chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Peers,
    Elect,
    Info,
    History,
    Log,
    /// Make another node the one the console speaks for.
    Switch(NodeId),
    Crash(NodeId),
    Restore(NodeId),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, NodeError> {
        line.parse()
    }
}

impl FromStr for Command {
    type Err = NodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(NodeError::InvalidInput("empty input".to_string()));
        }
        if !line.starts_with('/') {
            return Ok(Command::Send(line.to_string()));
        }

        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or("");
        let arg = words.next();
        if words.next().is_some() {
            return Err(NodeError::InvalidInput(format!("too many arguments to {}", verb)));
        }
        let cmd = match (verb, arg) {
            ("/peers", None) => Command::Peers,
            ("/elect", None) => Command::Elect,
            ("/info", None) => Command::Info,
            ("/history", None) => Command::History,
            ("/log", None) => Command::Log,
            ("/quit", None) => Command::Quit,
            ("/node", Some(id)) => Command::Switch(node_id(id)?),
            ("/crash", Some(id)) => Command::Crash(node_id(id)?),
            ("/restore", Some(id)) => Command::Restore(node_id(id)?),
            ("/node", None) | ("/crash", None) | ("/restore", None) => {
                return Err(NodeError::InvalidInput(format!("{} needs a node id", verb)))
            }
            (_, Some(_)) if is_known(verb) => {
                return Err(NodeError::InvalidInput(format!("{} takes no arguments", verb)))
            }
            _ => return Err(NodeError::InvalidInput(format!("unknown command {}", verb))),
        };
        Ok(cmd)
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb,
        "/peers" | "/elect" | "/info" | "/history" | "/log" | "/quit"
    )
}

fn node_id(word: &str) -> Result<NodeId, NodeError> {
    word.parse()
        .map_err(|_| NodeError::InvalidInput(format!("`{}` is not a node id", word)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            Command::parse("  hello there "),
            Ok(Command::Send("hello there".into()))
        );
    }

    #[test]
    fn slash_commands() {
        assert_eq!(Command::parse("/peers"), Ok(Command::Peers));
        assert_eq!(Command::parse("/elect"), Ok(Command::Elect));
        assert_eq!(Command::parse("/node 3"), Ok(Command::Switch(NodeId(3))));
        assert_eq!(Command::parse("/crash 2"), Ok(Command::Crash(NodeId(2))));
        assert_eq!(Command::parse("/restore 2"), Ok(Command::Restore(NodeId(2))));
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
    }

    #[test]
    fn malformed_commands_are_invalid_input() {
        for line in &["", "   ", "/bogus", "/node", "/node x", "/crash -1", "/peers 3", "/node 1 2"] {
            match Command::parse(line) {
                Err(NodeError::InvalidInput(_)) => (),
                other => panic!("{:?} parsed as {:?}", line, other),
            }
        }
    }
}
