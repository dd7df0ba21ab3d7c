// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs,
    io::{self, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use flatq_common_telemetry::{
    logging::{LogFormat, LoggingOptions, init_global_logging},
    panic_hook::set_panic_hook,
};
use flatq_queue::{
    DEFAULT_MAGIC, DequeueOrder, ErrorKind, FlushMode, Queue, QueueBuilder, QueueConfig,
    QueueError, StdFileSystem,
};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("Queue operation failed"))]
    Queue { source: QueueError },

    #[snafu(display("Failed to read payload from {from}"))]
    ReadPayload { from: String, source: io::Error },

    #[snafu(display("Failed to write to stdout"))]
    WriteOutput { source: io::Error },
}

impl CliError {
    /// Queue failures exit with their stable error code; local I/O failures
    /// count as file operation errors.
    fn exit_code(&self) -> u8 {
        match self {
            Self::Queue { source } => source.kind().code(),
            Self::ReadPayload { .. } | Self::WriteOutput { .. } => ErrorKind::FileOp.code(),
        }
    }
}

type Result<T, E = CliError> = std::result::Result<T, E>;

#[derive(Debug, Parser)]
#[clap(
name = "flatq",
about = "Inspect and drive file-per-message queues",
author = env!("CARGO_PKG_AUTHORS"),
version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Host directory standing in for the device filesystem root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Queue directory, relative to the root.
    #[arg(long, global = true, default_value = "/queue")]
    prefix: String,

    /// Tag identifying the queue's entries, decimal or 0x-prefixed hex.
    #[arg(long, global = true, value_parser = parse_magic, default_value_t = DEFAULT_MAGIC)]
    magic: u32,

    /// Which entry a dequeue takes: oldest or latest.
    #[arg(long, global = true, default_value_t = DequeueOrder::Oldest)]
    order: DequeueOrder,

    /// Do not append or verify payload checksums.
    #[arg(long, global = true)]
    no_checksum: bool,

    /// Sync each entry to storage before enqueue returns.
    #[arg(long, global = true)]
    sync: bool,
}

impl QueueArgs {
    fn config(&self) -> QueueConfig {
        QueueConfig {
            magic:      self.magic,
            order:      self.order,
            checksum:   !self.no_checksum,
            flush_mode: if self.sync {
                FlushMode::Sync
            } else {
                FlushMode::Async
            },
        }
    }

    fn open(&self) -> Result<Queue<StdFileSystem>> {
        QueueBuilder::new(StdFileSystem::new(&self.root))
            .config(self.config())
            .open(&self.prefix)
            .context(QueueSnafu)
    }
}

#[derive(Debug, Clone, Args)]
struct LoggingArgs {
    /// Log filter, e.g. `debug` or `flatq_queue=trace`. Defaults to RUST_LOG,
    /// then `warn`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: text or json.
    #[arg(long, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also write rotated log files into this directory.
    #[arg(long, global = true)]
    log_dir: Option<String>,
}

impl LoggingArgs {
    fn options(&self) -> LoggingOptions {
        LoggingOptions {
            dir: self.log_dir.clone().unwrap_or_default(),
            level: self
                .log_level
                .clone()
                .or_else(|| std::env::var("RUST_LOG").ok())
                .or_else(|| Some("warn".to_string())),
            log_format: self.log_format,
            ..Default::default()
        }
    }
}

fn parse_magic(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid magic number '{s}': {e}"))
}

#[derive(Debug, Subcommand)]
enum Commands {
    Enqueue(EnqueueArgs),
    Dequeue(DequeueArgs),
    Status(StatusArgs),
    Purge(PurgeArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Store one message per argument, or a single message read from --file or stdin.
Examples:

flatq enqueue 'temperature=21.5'
flatq --prefix /alarms enqueue --sequence 1700000000 'door open'
cat reading.bin | flatq enqueue

")]
struct EnqueueArgs {
    /// Ordering key; 0 assigns the next counter value.
    #[arg(long, short, default_value_t = 0)]
    sequence: u32,

    /// Read the payload from this file.
    #[arg(long, short, conflicts_with = "messages")]
    file: Option<PathBuf>,

    /// Messages to store.
    messages: Vec<String>,
}

impl EnqueueArgs {
    fn run(&self, queue: &mut Queue<StdFileSystem>) -> Result<()> {
        let payloads = if !self.messages.is_empty() {
            self.messages.iter().map(|m| m.as_bytes().to_vec()).collect()
        } else if let Some(path) = &self.file {
            vec![fs::read(path).context(ReadPayloadSnafu {
                from: path.display().to_string(),
            })?]
        } else {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context(ReadPayloadSnafu { from: "stdin" })?;
            vec![buf]
        };

        let mut stdout = io::stdout().lock();
        for payload in payloads {
            let id = queue.enqueue(self.sequence, &payload).context(QueueSnafu)?;
            writeln!(stdout, "{id}").context(WriteOutputSnafu)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Take messages off the queue and write their payloads to stdout, one per line.
Examples:

flatq dequeue
flatq --order latest dequeue --count 10
flatq dequeue --all --raw > drained.bin

")]
struct DequeueArgs {
    /// Number of messages to take.
    #[arg(long, short = 'n', default_value_t = 1, conflicts_with = "all")]
    count: usize,

    /// Take messages until the queue is empty.
    #[arg(long)]
    all: bool,

    /// Select by file name only, without checking entry tags.
    #[arg(long)]
    fast: bool,

    /// Write payloads as-is, without sequence numbers or newlines.
    #[arg(long)]
    raw: bool,
}

impl DequeueArgs {
    fn run(&self, queue: &mut Queue<StdFileSystem>) -> Result<()> {
        let mut stdout = io::stdout().lock();
        let mut taken = 0usize;
        while self.all || taken < self.count {
            let message = match queue.dequeue(self.fast) {
                Ok(message) => message,
                Err(err) if err.kind() == ErrorKind::QueueEmpty && (self.all || taken > 0) => {
                    break;
                }
                Err(err) => return Err(err).context(QueueSnafu),
            };
            if self.raw {
                stdout.write_all(&message.payload).context(WriteOutputSnafu)?;
            } else {
                writeln!(
                    stdout,
                    "{}\t{}",
                    message.sequence,
                    String::from_utf8_lossy(&message.payload)
                )
                .context(WriteOutputSnafu)?;
            }
            taken += 1;
        }
        tracing::debug!(taken, "Dequeue finished");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Show whether the queue holds entries and where its sequence counter stands.
Examples:

flatq status
flatq --magic 0xA55AC0DE status --fast

")]
struct StatusArgs {
    /// Count every file under the prefix, not only this queue's entries.
    #[arg(long)]
    fast: bool,
}

impl StatusArgs {
    fn run(&self, queue: &Queue<StdFileSystem>) -> Result<()> {
        let empty = queue.is_empty(self.fast).context(QueueSnafu)?;
        let mut stdout = io::stdout().lock();
        let watermark = queue
            .watermark()
            .map_or_else(|| "-".to_string(), |w| w.to_string());
        writeln!(
            stdout,
            "prefix:        {}\nmagic:         {:#010x}\nempty:         {empty}\nnext sequence: \
             {}\nwatermark:     {watermark}",
            queue.prefix(),
            queue.config().magic,
            queue.next_sequence(),
        )
        .context(WriteOutputSnafu)
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Delete every entry of the queue and its directory if nothing else is left.
Examples:

flatq purge
flatq --prefix /alarms purge --fast

")]
struct PurgeArgs {
    /// Delete every file under the prefix, not only this queue's entries.
    #[arg(long)]
    fast: bool,
}

impl PurgeArgs {
    fn run(&self, queue: &mut Queue<StdFileSystem>) -> Result<()> {
        let removed = queue.purge(self.fast).context(QueueSnafu)?;
        writeln!(io::stdout().lock(), "removed {removed} entries").context(WriteOutputSnafu)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut queue = cli.queue.open()?;
    let result = match &cli.commands {
        Commands::Enqueue(args) => args.run(&mut queue),
        Commands::Dequeue(args) => args.run(&mut queue),
        Commands::Status(args) => args.run(&queue),
        Commands::Purge(args) => args.run(&mut queue),
    };
    queue.end();
    result
}

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guards = init_global_logging("flatq", &cli.logging.options());
    set_panic_hook();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            tracing::error!(error = ?err, code, "Command failed");
            eprintln!("{}", snafu::Report::from_error(err));
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_cli_definition() { Cli::command().debug_assert(); }

    #[test_case("42" => 42; "decimal")]
    #[test_case("0x2A" => 42; "hex")]
    #[test_case("0XA55A_C0DE" => 0xA55A_C0DE; "hex with separator")]
    #[test_case("4294967295" => u32::MAX; "max")]
    fn test_parse_magic(s: &str) -> u32 { parse_magic(s).unwrap() }

    #[test_case("0x"; "empty hex")]
    #[test_case("0x1_0000_0000"; "hex overflow")]
    #[test_case("-1"; "negative")]
    #[test_case("abc"; "garbage")]
    fn test_parse_magic_rejects(s: &str) { assert!(parse_magic(s).is_err()); }

    #[test]
    fn test_global_flags_build_config() {
        let cli = Cli::parse_from([
            "flatq",
            "dequeue",
            "--magic",
            "0x10",
            "--order",
            "latest",
            "--no-checksum",
            "--sync",
        ]);
        let config = cli.queue.config();
        assert_eq!(config.magic, 0x10);
        assert_eq!(config.order, DequeueOrder::Latest);
        assert!(!config.checksum);
        assert_eq!(config.flush_mode, FlushMode::Sync);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["flatq", "status"]);
        assert_eq!(cli.queue.config(), QueueConfig::default());
        assert_eq!(cli.queue.prefix, "/queue");
        assert_eq!(cli.logging.log_format, LogFormat::Text);
    }

    #[test]
    fn test_enqueue_args() {
        let cli = Cli::parse_from(["flatq", "enqueue", "-s", "7", "a", "b"]);
        let Commands::Enqueue(args) = cli.commands else {
            panic!("expected enqueue");
        };
        assert_eq!(args.sequence, 7);
        assert_eq!(args.messages, vec!["a", "b"]);
    }

    #[test]
    fn test_exit_code_follows_queue_error_kind() {
        let err = CliError::Queue {
            source: flatq_queue::error::QueueEmptySnafu.build(),
        };
        assert_eq!(err.exit_code(), ErrorKind::QueueEmpty.code());

        let err = CliError::WriteOutput {
            source: io::Error::other("closed"),
        };
        assert_eq!(err.exit_code(), ErrorKind::FileOp.code());
    }

    #[test]
    fn test_enqueue_dequeue_through_cli() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap();

        let cli = Cli::parse_from(["flatq", "--root", root, "enqueue", "one", "two"]);
        run(&cli).unwrap();

        let cli = Cli::parse_from(["flatq", "--root", root, "status"]);
        let queue = cli.queue.open().unwrap();
        assert!(!queue.is_empty(false).unwrap());
        assert_eq!(queue.next_sequence(), 3);

        let cli = Cli::parse_from(["flatq", "--root", root, "dequeue", "--all"]);
        run(&cli).unwrap();

        let queue = cli.queue.open().unwrap();
        assert!(queue.is_empty(false).unwrap());
    }
}
