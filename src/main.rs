use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use cmq_tdmq::config::{init_logging, ConnectionArgs};
use cmq_tdmq::{CmqClient, CmqResult, Limits};

#[derive(Parser)]
#[command(name = "tcmqcli", version)]
#[command(about = "Command line client for TDMQ CMQ queues and topics")]
#[command(after_help = "Examples:\n  \
    tcmqcli send -d --uri https://cmq-gz.public.tencenttdmq.com --sid AKID... --key xxx -q test -l 10\n  \
    tcmqcli receives --uri https://cmq-gz.public.tencenttdmq.com --sid AKID... --key xxx -q test -n 5")]
struct Cli {
    /// Request uri
    #[arg(long, global = true, env = "CMQ_URI", default_value = "")]
    uri: String,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print debug log
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Message source shared by send and publish commands
#[derive(Args, Debug)]
struct MessageArgs {
    /// Message, repeat '-m' 2~16 times to set multi messages
    #[arg(short = 'm', long = "msg")]
    messages: Vec<String>,

    /// Send/publish a message of this length in bytes
    #[arg(short = 'l', long, default_value = "0")]
    length: usize,
}

impl MessageArgs {
    fn single(&self) -> Result<String> {
        match self.messages.first() {
            Some(m) if !m.is_empty() => Ok(m.clone()),
            _ if self.length > 0 => Ok(generated(self.length)),
            _ => bail!("no message to send, use -m to set message"),
        }
    }

    fn batch(&self, number: usize) -> Result<Vec<String>> {
        if !self.messages.is_empty() {
            if self.messages.iter().any(String::is_empty) {
                bail!("message is empty");
            }
            return Ok(self.messages.clone());
        }
        if self.length > 0 {
            return Ok(vec![generated(self.length); number.max(1)]);
        }
        bail!("no message to send, use -m to set message")
    }
}

/// A message of `length` bytes; raises the size limit when needed
fn generated(length: usize) -> String {
    if length > Limits::current().max_message_size {
        Limits::update(|l| l.max_message_size = length);
    }
    "#".repeat(length)
}

#[derive(Subcommand)]
enum Command {
    /// Query the route of a queue or a topic
    Query {
        /// Queue name
        #[arg(short = 'q', long)]
        queue: Option<String>,
        /// Topic name
        #[arg(short = 't', long)]
        topic: Option<String>,
    },

    /// Send one message
    Send {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        #[command(flatten)]
        message: MessageArgs,
        /// Seconds before the message becomes visible
        #[arg(long, default_value = "0")]
        delay: u64,
    },

    /// Send a batch of messages
    Sends {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        #[command(flatten)]
        message: MessageArgs,
        /// Number of generated messages when using -l
        #[arg(short = 'n', long, default_value = "16")]
        number: usize,
        #[arg(long, default_value = "0")]
        delay: u64,
    },

    /// Receive one message
    Receive {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        /// Long polling wait in seconds
        #[arg(long, default_value = "5")]
        wait: u64,
        /// Delete the message once received
        #[arg(long)]
        ack: bool,
    },

    /// Receive a batch of messages
    Receives {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        #[arg(long, default_value = "5")]
        wait: u64,
        #[arg(short = 'n', long, default_value = "16")]
        number: usize,
        #[arg(long)]
        ack: bool,
    },

    /// Delete one message by receipt handle
    Delete {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        /// Receipt handle
        #[arg(long = "handle")]
        handles: Vec<String>,
    },

    /// Delete messages by receipt handle, repeat --handle 2~16 times
    Deletes {
        #[arg(short = 'q', long, default_value = "")]
        queue: String,
        #[arg(long = "handle")]
        handles: Vec<String>,
    },

    /// Publish one message
    Publish {
        #[arg(short = 't', long, default_value = "")]
        topic: String,
        #[command(flatten)]
        message: MessageArgs,
        /// Routing key
        #[arg(short = 'r', long, default_value = "")]
        route: String,
        /// Message tag, repeat to set multi tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Publish a batch of messages
    Publishes {
        #[arg(short = 't', long, default_value = "")]
        topic: String,
        #[command(flatten)]
        message: MessageArgs,
        #[arg(short = 'n', long, default_value = "16")]
        number: usize,
        #[arg(short = 'r', long, default_value = "")]
        route: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn print<T: Serialize>(resp: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(resp)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.debug);

    let config = cli
        .connection
        .client_config(&cli.uri)
        .context("invalid client configuration")?;
    let client = CmqClient::new(config).context("new TDMQ-CMQ client")?;

    run(&client, cli.command).await
}

async fn run(client: &CmqClient, command: Command) -> Result<()> {
    match command {
        Command::Query { queue, topic } => match (queue, topic) {
            (Some(q), _) if !q.is_empty() => {
                print(&client.query_queue_route(&q).await.context("query queue route")?)
            }
            (_, Some(t)) if !t.is_empty() => {
                print(&client.query_topic_route(&t).await.context("query topic route")?)
            }
            _ => bail!("invalid query parameters, use -q <queue> or -t <topic>"),
        },

        Command::Send {
            queue,
            message,
            delay,
        } => {
            let msg = message.single()?;
            let resp = client
                .send_message(&queue, &msg, delay)
                .await
                .context("send message")?;
            print(&resp)
        }

        Command::Sends {
            queue,
            message,
            number,
            delay,
        } => {
            let msgs = message.batch(number)?;
            let resp = client
                .batch_send_message(&queue, &msgs, delay)
                .await
                .context("batch send message")?;
            print(&resp)
        }

        Command::Receive { queue, wait, ack } => {
            let resp = client
                .receive_message(&queue, wait)
                .await
                .context("receive message")?;
            print(&resp)?;
            if ack && resp.is_success() {
                let deleted = client
                    .delete_message(&queue, resp.receipt_handle())
                    .await
                    .context("delete message")?;
                print(&deleted)?;
            }
            Ok(())
        }

        Command::Receives {
            queue,
            wait,
            number,
            ack,
        } => {
            let resp = client
                .batch_receive_message(&queue, wait, number)
                .await
                .context("batch receive message")?;
            print(&resp)?;
            let handles = resp.receipt_handles();
            if ack && resp.is_success() && !handles.is_empty() {
                let deleted = client
                    .batch_delete_message(&queue, &handles)
                    .await
                    .context("batch delete message")?;
                print(&deleted)?;
            }
            Ok(())
        }

        Command::Delete { queue, handles } => {
            let Some(handle) = handles.first() else {
                bail!("no handle to delete, use --handle to set handle");
            };
            let resp = client
                .delete_message(&queue, handle)
                .await
                .context("delete message")?;
            print(&resp)
        }

        Command::Deletes { queue, handles } => {
            let resp = client
                .batch_delete_message(&queue, &handles)
                .await
                .context("delete messages")?;
            print(&resp)
        }

        Command::Publish {
            topic,
            message,
            route,
            tags,
        } => {
            let msg = message.single()?;
            let resp = client
                .publish_message(&topic, &msg, &route, &tags)
                .await
                .context("publish message")?;
            print(&resp)
        }

        Command::Publishes {
            topic,
            message,
            number,
            route,
            tags,
        } => {
            let msgs = message.batch(number)?;
            let resp = client
                .batch_publish_message(&topic, &route, &msgs, &tags)
                .await
                .context("batch publish message")?;
            print(&resp)
        }
    }
}
