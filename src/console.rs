use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use ethers::types::{Address, U256};
use ethers::utils::{format_ether, format_units, to_checksum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};

use crate::session::ConnectionManager;
use crate::types::{SessionEvent, StoredTransaction};

const HELP: &str = "\
Commands:
  connect <address> [endpoint]   watch a contract (endpoint defaults to NODE_ENDPOINT)
  disconnect                     stop watching and clear the list
  list                           show every stored transaction
  show <n>                       full fields of transaction n
  relay <n>                      send transaction n again at double gas price
  help                           this text
  quit                           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { contract: String, endpoint: Option<String> },
    Disconnect,
    List,
    Show(usize),
    Relay(usize),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;
        let index = |arg: Option<&str>| -> Result<usize, String> {
            let arg = arg.ok_or_else(|| format!("usage: {} <n>", verb))?;
            arg.trim_start_matches('#')
                .parse()
                .map_err(|_| format!("not a transaction number: {}", arg))
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => {
                let contract = words
                    .next()
                    .ok_or_else(|| "usage: connect <address> [endpoint]".to_string())?
                    .to_string();
                Command::Connect {
                    contract,
                    endpoint: words.next().map(str::to_string),
                }
            }
            "disconnect" => Command::Disconnect,
            "list" | "ls" => Command::List,
            "show" => Command::Show(index(words.next())?),
            "relay" | "send" => Command::Relay(index(words.next())?),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command `{}`, try `help`", other)),
        };

        match words.next() {
            Some(extra) => Err(format!("unexpected argument `{}`", extra)),
            None => Ok(command),
        }
    }
}

/// Keeps the first `start` and last `end` characters of long values.
pub fn truncate_text(text: &str, start: usize, end: usize) -> String {
    let len = text.chars().count();
    if len <= start + end + 5 {
        return text.to_string();
    }
    let head: String = text.chars().take(start).collect();
    let tail: String = text.chars().skip(len - end).collect();
    format!("{}...{}", head, tail)
}

fn short(text: &str) -> String {
    truncate_text(text, 6, 4)
}

fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

fn gwei(value: Option<U256>) -> String {
    match value {
        Some(v) => format_units(v, "gwei")
            .map(|g| format!("{} gwei", g))
            .unwrap_or_else(|_| v.to_string()),
        None => "-".to_string(),
    }
}

pub fn render_summary(stored: &StoredTransaction) -> String {
    let tx = &stored.tx;
    let to = tx.to.as_ref().map(checksum).unwrap_or_default();
    format!(
        "#{:<3} Hash: {}  From: {}  To: {}  Value: {}  Gas Price: {}\n     Data: {}",
        stored.index,
        short(&format!("{:?}", tx.hash)),
        short(&checksum(&tx.from)),
        short(&to),
        tx.value,
        gwei(tx.gas_price),
        short(&stored.decoded),
    )
}

pub fn render_details(stored: &StoredTransaction) -> String {
    let tx = &stored.tx;
    let to = tx.to.as_ref().map(checksum).unwrap_or_else(|| "-".to_string());
    format!(
        "#{} observed {}\n  Hash:      {:?}\n  From:      {}\n  To:        {}\n  Value:     {} wei ({} ETH)\n  Gas Price: {}\n  Gas:       {}\n  Nonce:     {}\n  Data:      {}\n  Raw:       {}",
        stored.index,
        stored.observed_at.to_rfc3339(),
        tx.hash,
        checksum(&tx.from),
        to,
        tx.value,
        format_ether(tx.value),
        gwei(tx.gas_price),
        tx.gas,
        tx.nonce,
        stored.decoded,
        tx.input,
    )
}

/// Line-oriented terminal front end.
pub struct Console {
    manager: Arc<ConnectionManager>,
}

impl Console {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub async fn run(self) -> Result<()> {
        let printer = tokio::spawn(print_events(self.manager.subscribe()));

        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(e) => println!("{}", e),
            }
        }

        printer.abort();
        Ok(())
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Connect { contract, endpoint } => {
                if let Err(e) = self.manager.connect(&contract, endpoint.as_deref()).await {
                    error!("Connect failed: {}", e);
                }
            }
            Command::Disconnect => {
                if !self.manager.disconnect().await {
                    println!("Not connected");
                }
            }
            Command::List => {
                let entries = self.manager.store().snapshot().await;
                if entries.is_empty() {
                    println!("No pending transactions found.");
                }
                for stored in &entries {
                    println!("{}", render_summary(stored));
                }
            }
            Command::Show(index) => match self.manager.store().get(index).await {
                Some(stored) => println!("{}", render_details(&stored)),
                None => println!("No transaction #{}", index),
            },
            Command::Relay(index) => {
                // outcome is reported through the log
                let _ = self.manager.spawn_relay(index);
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Connected(target)) => {
                println!("Watching {} for pending transactions", checksum(&target.contract));
            }
            Ok(SessionEvent::TransactionAdded(stored)) => println!("{}", render_summary(&stored)),
            Ok(SessionEvent::Cleared) => println!("Transaction list cleared"),
            Ok(SessionEvent::ConnectionLost { reason }) => {
                println!("Connection lost: {}. Use `connect` to start again.", reason);
            }
            Err(RecvError::Lagged(skipped)) => warn!("Display fell behind, {} events skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
