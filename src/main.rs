// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

//! A console for driving a group of chat nodes that live in this process and
//! talk through an in-memory directory. Type to chat as the current node;
//! lines starting with `/` are commands (`/peers`, `/elect`, `/info`,
//! `/history`, `/log`, `/node <id>`, `/crash <id>`, `/restore <id>`,
//! `/quit`).

use anyhow::{bail, Context};
use clap::Parser;
use conclave::{Command, FailureDetector, LocalGateway, Node, NodeConfig, NodeError, NodeId};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conclave", about = "Bully-elected chat group console")]
struct Args {
    /// Nodes to start, as comma-separated `id:name` pairs.
    #[arg(long, default_value = "1:alice,2:bob,3:carol")]
    nodes: String,

    /// JSON file of node settings shared by every node; id and name are
    /// taken from `--nodes`.
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Member {
    node: Arc<Node>,
    detector: Option<FailureDetector>,
}

struct Console {
    gateway: Arc<LocalGateway>,
    members: BTreeMap<NodeId, Member>,
    current: NodeId,
}

fn parse_nodes(spec: &str) -> anyhow::Result<Vec<(NodeId, String)>> {
    let mut nodes = Vec::new();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, name) = match pair.find(':') {
            Some(i) => (&pair[..i], &pair[i + 1..]),
            None => bail!("expected id:name, got `{}`", pair),
        };
        let id: NodeId = id
            .parse()
            .with_context(|| format!("bad node id in `{}`", pair))?;
        nodes.push((id, name.trim().to_string()));
    }
    if nodes.is_empty() {
        bail!("no nodes given");
    }
    Ok(nodes)
}

impl Console {
    fn start(args: &Args) -> anyhow::Result<Console> {
        let template = match &args.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                NodeConfig::from_json(&text)?
            }
            None => NodeConfig::default(),
        };
        let gateway = Arc::new(LocalGateway::new());
        let mut members = BTreeMap::new();
        for (id, name) in parse_nodes(&args.nodes)? {
            let config = NodeConfig {
                id,
                name,
                ..template.clone()
            };
            let node = Node::new(config, gateway.clone())?;
            node.join();
            let detector = FailureDetector::spawn(&node)?;
            members.insert(
                id,
                Member {
                    node,
                    detector: Some(detector),
                },
            );
        }
        let current = match members.keys().next() {
            Some(id) => *id,
            None => bail!("no nodes started"),
        };
        Ok(Console {
            gateway,
            members,
            current,
        })
    }

    fn member(&self, id: NodeId) -> anyhow::Result<&Member> {
        self.members
            .get(&id)
            .ok_or_else(|| NodeError::NotFound(format!("node {}", id)).into())
    }

    /// Run one command. Returns false on `/quit`.
    fn execute(&mut self, cmd: Command) -> anyhow::Result<bool> {
        let node = self.member(self.current)?.node.clone();
        match cmd {
            Command::Send(text) => {
                let message = node.send_message(&text)?;
                println!("{}", message);
            }
            Command::Peers => {
                for record in node.list_peers() {
                    let mark = if Some(record.id) == node.coordinator() {
                        " (coordinator)"
                    } else {
                        ""
                    };
                    println!("{}{}", record, mark);
                }
            }
            Command::Elect => {
                if !node.start_election() {
                    println!("election already in progress");
                }
            }
            Command::Info => println!("{}", node.node_info()),
            Command::History => node.message_history().iter().for_each(|m| println!("{}", m)),
            Command::Log => node.system_log().iter().for_each(|l| println!("{}", l)),
            Command::Switch(id) => {
                self.member(id)?;
                self.current = id;
                println!("now speaking as node {}", id);
            }
            Command::Crash(id) => {
                let name = self.member(id)?.node.config().directory_name();
                if let Some(detector) = self.members.get_mut(&id).and_then(|m| m.detector.take()) {
                    detector.stop();
                }
                self.gateway.crash(&name);
                warn!("crashed node {}", id);
            }
            Command::Restore(id) => {
                let restored = self.member(id)?.node.clone();
                self.gateway.restore(&restored.config().directory_name());
                restored.join();
                restored.start_election();
                let detector = FailureDetector::spawn(&restored)?;
                if let Some(member) = self.members.get_mut(&id) {
                    member.detector = Some(detector);
                }
                info!("restored node {}", id);
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let mut console = Console::start(&args)?;

    let stdin = io::stdin();
    loop {
        print!("[{}]> ", console.current);
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let keep_going = Command::parse(&line)
            .map_err(anyhow::Error::from)
            .and_then(|cmd| console.execute(cmd));
        match keep_going {
            Ok(true) => (),
            Ok(false) => break,
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(())
}
