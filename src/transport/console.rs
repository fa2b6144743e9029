// Console transport - stands in for the chat platform.
//
// Each stdin line is one inbound event: `<user_id>[@username] <text>`.
// Text starting with `/` is a command, anything else is a channel message.
// Every line is handled on its own task, so events from many users run
// concurrently the way they would from a real chat gateway.

use super::handlers::{ChannelHandlers, Reply};
use crate::core::moderation::ModerationStore;
use crate::core::storage::UserMeta;
use crate::core::voting::{VoteStore, VoteType};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};

const DEFAULT_TOP_LIMIT: usize = 10;

const HELP_TEXT: &str = "Commands:
  /propose <title>        suggest a topic
  /vote <topic> [up|down] vote for a topic
  /top [n]                best topics
  /results <topic>        tally for one topic
  /current                newest active topic
  /myvotes                your votes
  /stats                  your activity
  /unblock <user>         admins only
  /close <topic>          admins only";

/// One parsed inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Message(String),
    Propose(String),
    Vote { topic_id: i64, vote_type: VoteType },
    Top(usize),
    Results(i64),
    Current,
    MyVotes,
    Stats,
    Unblock(i64),
    Close(i64),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_id(raw: Option<&str>, what: &str) -> Result<i64, ParseError> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError(format!("expected a {} id", what)))
}

fn parse_sender(raw: &str) -> Result<UserMeta, ParseError> {
    let (id, username) = match raw.split_once('@') {
        Some((id, name)) if !name.is_empty() => (id, Some(name)),
        Some((id, _)) => (id, None),
        None => (raw, None),
    };
    let user_id = id
        .parse::<i64>()
        .map_err(|_| ParseError(format!("'{}' is not a user id", raw)))?;
    let meta = UserMeta::new(user_id);
    Ok(match username {
        Some(name) => meta.with_username(name),
        None => meta,
    })
}

fn parse_command(body: &str) -> Result<Command, ParseError> {
    let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    match name {
        "/propose" => Ok(Command::Propose(rest.to_string())),
        "/vote" => {
            let topic_id = parse_id(args.next(), "topic")?;
            let vote_type = match args.next() {
                Some(raw) => raw.parse::<VoteType>().map_err(ParseError)?,
                None => VoteType::Up,
            };
            Ok(Command::Vote {
                topic_id,
                vote_type,
            })
        }
        "/top" => match args.next() {
            Some(raw) => raw
                .parse::<usize>()
                .map(Command::Top)
                .map_err(|_| ParseError(format!("'{}' is not a number", raw))),
            None => Ok(Command::Top(DEFAULT_TOP_LIMIT)),
        },
        "/results" => Ok(Command::Results(parse_id(args.next(), "topic")?)),
        "/current" => Ok(Command::Current),
        "/myvotes" => Ok(Command::MyVotes),
        "/stats" => Ok(Command::Stats),
        "/unblock" => Ok(Command::Unblock(parse_id(args.next(), "user")?)),
        "/close" => Ok(Command::Close(parse_id(args.next(), "topic")?)),
        "/help" | "/start" => Ok(Command::Help),
        other => Err(ParseError(format!("unknown command {}", other))),
    }
}

/// Split a console line into its sender and event.
pub fn parse_line(line: &str) -> Result<(UserMeta, Command), ParseError> {
    let line = line.trim();
    let (sender, body) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| ParseError("expected '<user_id>[@username] <text>'".to_string()))?;
    let sender = parse_sender(sender)?;
    let body = body.trim();

    let command = if body.starts_with('/') {
        parse_command(body)?
    } else {
        Command::Message(body.to_string())
    };
    Ok((sender, command))
}

pub async fn dispatch<S: ModerationStore + VoteStore>(
    handlers: &ChannelHandlers<S>,
    sender: &UserMeta,
    command: Command,
) -> Reply {
    match command {
        Command::Message(text) => handlers.on_incoming_message(sender, &text).await,
        Command::Propose(title) => handlers.on_propose_command(sender, &title).await,
        Command::Vote {
            topic_id,
            vote_type,
        } => handlers.on_vote_command(sender, topic_id, vote_type).await,
        Command::Top(limit) => handlers.on_top_command(limit).await,
        Command::Results(topic_id) => handlers.on_results_command(topic_id).await,
        Command::Current => handlers.on_current_command().await,
        Command::MyVotes => handlers.on_my_votes_command(sender).await,
        Command::Stats => handlers.on_stats_command(sender).await,
        Command::Unblock(target) => handlers.on_unblock_command(sender, target).await,
        Command::Close(topic_id) => handlers.on_close_command(sender, topic_id).await,
        Command::Help => Reply::Notice(HELP_TEXT.to_string()),
    }
}

fn render(line_no: usize, sender: &UserMeta, reply: &Reply) {
    match reply {
        Reply::Silent => println!("[{}] ✔ message from {} published", line_no, sender.display_name()),
        Reply::Removed(text) => println!(
            "[{}] ✖ message from {} removed\n{}",
            line_no,
            sender.display_name(),
            text
        ),
        other => {
            if let Some(text) = other.text() {
                println!("[{}] {}", line_no, text);
            }
        }
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::error!("Event task failed: {}", e);
    }
}

/// Drop tasks that already finished without waiting on the rest.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(result) = tasks.try_join_next() {
        log_task_result(result);
        reaped += 1;
    }
    reaped
}

/// Read events from stdin until EOF, handling each on its own task.
pub async fn run<S>(handlers: Arc<ChannelHandlers<S>>) -> anyhow::Result<()>
where
    S: ModerationStore + VoteStore + 'static,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        line_no += 1;

        let (sender, command) = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("[{}] ❓ {}", line_no, e);
                continue;
            }
        };

        let handlers = Arc::clone(&handlers);
        tasks.spawn(async move {
            let reply = dispatch(&handlers, &sender, command).await;
            render(line_no, &sender, &reply);
        });

        // Finished tasks are dropped as we go instead of piling up until EOF.
        reap_finished(&mut tasks);
    }

    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
    tracing::info!("Input closed after {} events", line_no);
    Ok(())
}
