//! Purpose: `jsonh` CLI entry point for inspecting JSON through opaque handles.
//! Role: Binary crate root; parses args, walks a path with handle operations, prints results.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Every handle is minted for a single CLI owner and released before exit.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jsonhandle::api::{
    Access, EncodeFlags, Error, ErrorKind, Handle, IterRead, IterStep, JsonType, OwnerId,
    Runtime, Session, to_exit_code,
};

const CLI_OWNER: OwnerId = OwnerId(1);

#[derive(Parser)]
#[command(
    name = "jsonh",
    version,
    about = "Inspect JSON documents through reference-counted handles",
    long_about = "Parse a JSON document, walk a path of object keys and array indices, \
and report on the value found there.\n\nPath segments are keys for objects and \
integer indices for arrays; negative indices are out of range."
)]
struct Cli {
    #[command(flatten)]
    input: InputArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct InputArgs {
    /// Read the document from a file instead of stdin
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct EncodeArgs {
    /// Pretty-print with N spaces of indentation (0-31)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=31))]
    indent: Option<u32>,
    /// Drop the space after ',' and ':'
    #[arg(long)]
    compact: bool,
    /// Emit object keys in sorted order
    #[arg(long)]
    sort_keys: bool,
    /// Escape every non-ASCII character
    #[arg(long)]
    ascii: bool,
}

impl EncodeArgs {
    fn flags(&self) -> EncodeFlags {
        let mut flags = EncodeFlags::indent(self.indent.unwrap_or(0));
        if self.compact {
            flags = flags.with(EncodeFlags::COMPACT);
        }
        if self.sort_keys {
            flags = flags.with(EncodeFlags::SORT_KEYS);
        }
        if self.ascii {
            flags = flags.with(EncodeFlags::ENSURE_ASCII);
        }
        flags
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the JSON type of the value at PATH
    Type {
        #[arg(allow_negative_numbers = true)]
        path: Vec<String>,
    },
    /// Print the number of elements or entries at PATH
    Len {
        #[arg(allow_negative_numbers = true)]
        path: Vec<String>,
    },
    /// Print the keys of the object at PATH, one per line
    Keys {
        #[arg(allow_negative_numbers = true)]
        path: Vec<String>,
    },
    /// Serialize the value at PATH
    Get {
        #[arg(allow_negative_numbers = true)]
        path: Vec<String>,
        #[command(flatten)]
        encode: EncodeArgs,
    },
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)));
            }
        },
    };

    let text = read_input(&cli.input)?;
    let mut runtime = Runtime::new();
    let result = {
        let mut session = runtime.session(CLI_OWNER);
        dispatch(&mut session, &text, cli.command)
    };
    let released = runtime.release_owner(CLI_OWNER);
    debug!(released, "cli handles released");
    result.map(|()| 0)
}

fn dispatch(session: &mut Session<'_>, text: &str, command: Command) -> Result<(), Error> {
    let root = session.parse(text)?;
    match command {
        Command::Type { path } => {
            let target = walk(session, root, &path)?;
            println!("{}", session.type_of(target)?);
        }
        Command::Len { path } => {
            let target = walk(session, root, &path)?;
            let len = match session.type_of(target)? {
                JsonType::Array => session.array_size(target)?,
                JsonType::Object => session.object_size(target)?,
                other => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("len needs an array or object, found {other}")));
                }
            };
            if let Access::Value(len) = len {
                println!("{len}");
            }
        }
        Command::Keys { path } => {
            let target = walk(session, root, &path)?;
            for key in collect_keys(session, target)? {
                println!("{key}");
            }
        }
        Command::Get { path, encode } => {
            let target = walk(session, root, &path)?;
            println!("{}", session.dumps(target, encode.flags())?);
        }
    }
    Ok(())
}

/// Descends one segment at a time; each step mints a handle for the child.
fn walk(session: &mut Session<'_>, root: Handle, path: &[String]) -> Result<Handle, Error> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        let json_type = session.type_of(current)?;
        let step = match json_type {
            JsonType::Array => {
                let index = segment.parse::<i64>().map_err(|_| {
                    Error::new(ErrorKind::Usage).with_message(format!(
                        "path segment {depth} ({segment:?}) is not an array index"
                    ))
                })?;
                session.array_get(current, index)?
            }
            JsonType::Object => session.object_get(current, segment)?,
            _ => Access::WrongType,
        };
        current = match step {
            Access::Value(child) => child,
            Access::WrongType => {
                return Err(Error::new(ErrorKind::NotFound).with_message(format!(
                    "cannot descend into {json_type} at path segment {depth} ({segment:?})"
                )));
            }
            Access::OutOfRange => {
                return Err(Error::new(ErrorKind::NotFound).with_message(format!(
                    "path segment {depth} ({segment:?}) not found"
                )));
            }
        };
    }
    Ok(current)
}

fn collect_keys(session: &mut Session<'_>, object: Handle) -> Result<Vec<String>, Error> {
    let iter = match session.object_iter(object)? {
        Access::Value(iter) => iter,
        Access::OutOfRange => return Ok(Vec::new()),
        Access::WrongType => {
            let found = session.type_of(object)?;
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("keys needs an object, found {found}")));
        }
    };
    let mut keys = Vec::new();
    loop {
        match session.object_iter_read(iter)? {
            IterRead::Entry { key, value } => {
                session.close(value)?;
                keys.push(key);
            }
            IterRead::Exhausted => break,
        }
        if let IterStep::Exhausted = session.object_iter_next(iter)? {
            break;
        }
    }
    Ok(keys)
}

fn read_input(input: &InputArgs) -> Result<String, Error> {
    match &input.file {
        Some(path) => std::fs::read_to_string(path).map_err(|err| {
            let kind = if err.kind() == io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Usage
            };
            Error::new(kind)
                .with_message(format!("failed to read {}", path.display()))
                .with_source(err)
        }),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(text)
        }
    }
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        return;
    }
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::InvalidHandle => "invalid handle".to_string(),
        ErrorKind::Parse => "invalid json".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Limit => "handle limit reached".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let (Some(line), Some(column)) = (err.line(), err.column()) {
        inner.insert("line".to_string(), json!(line));
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(handle) = err.handle() {
        inner.insert("handle".to_string(), json!(handle));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
