//! `pipe`: write to pipes, change their settings, show their status.

use async_trait::async_trait;

use plumb_types::{CommandArgs, CommandResponse, PIPE_STATUS_HEADER, PipeMode, PlumbError, PlumbResult};

use super::{Command, CommandContext, CommandSchema};

/// Pipe command.
pub struct Pipe;

#[async_trait]
impl Command for Pipe {
    fn name(&self) -> &str {
        "pipe"
    }

    fn schema(&self) -> CommandSchema {
        CommandSchema::new("pipe", "write to, modify and inspect named pipes")
            .pattern("pipe")
            .pattern("pipe name <pipe> <mode,> <all,round-robin,random>")
            .pattern("pipe name <pipe> <log,> <true,false>")
            .pattern("pipe <truncate,> <length>")
            .pattern("pipe send <pipe> <data>")
            .pattern("pipe send <pipe> <via,> <command>...")
            .long(
                "Write a message to a pipe:

\tpipe send foo \"Hello pipes!\"

Mode \"all\" copies each message to every reader, \"round-robin\" picks one \
reader in attachment order and \"random\" picks one reader at random.

A via is a program every reader gets its own copy of. Messages pass through \
it before reaching that reader:

\tpipe send foo via normal -stddev 5.0

Pipes in other namespaces are named <namespace>//<pipe>.

Without arguments, shows every pipe in this namespace. \"pipe truncate 32\" \
shortens the previous message column to 32 characters without changing the \
stored message.",
            )
    }

    async fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<CommandResponse> {
        if args.has("truncate") {
            let raw = args.get("length").unwrap_or_default();
            let length = raw
                .parse::<usize>()
                .map_err(|_| PlumbError::invalid(format!("invalid truncation length: {raw}")))?;
            return Ok(status_table(ctx, Some(length)));
        }

        let Some(name) = args.get("pipe") else {
            return Ok(status_table(ctx, None));
        };
        let pipe = ctx.registry().get_or_create(&ctx.qualify(name));

        if args.has("mode") {
            pipe.set_mode(parse_mode(args)?);
        } else if args.has("log") {
            pipe.set_log(args.has("true"));
        } else if args.has("via") {
            pipe.set_via(via_command(args.get_list("command"))?);
        } else if let Some(data) = args.get("data") {
            pipe.write(data)?;
        } else {
            let status = pipe.status();
            return Ok(CommandResponse::table(PIPE_STATUS_HEADER, vec![status.row(None)]));
        }
        Ok(CommandResponse::empty())
    }
}

fn status_table(ctx: &CommandContext, truncate: Option<usize>) -> CommandResponse {
    let rows = ctx
        .registry()
        .statuses(Some(&ctx.namespace))
        .iter()
        .map(|status| status.row(truncate))
        .collect();
    CommandResponse::table(PIPE_STATUS_HEADER, rows)
}

/// Mode from the choice keyword, or from a `mode` string value.
fn parse_mode(args: &CommandArgs) -> PlumbResult<PipeMode> {
    for mode in [PipeMode::All, PipeMode::RoundRobin, PipeMode::Random] {
        if args.has(mode.as_str()) {
            return Ok(mode);
        }
    }
    match args.get("mode") {
        Some(value) => value.parse(),
        None => Err(PlumbError::invalid("mode requires one of all, round-robin, random")),
    }
}

/// A single word containing spaces is split like a shell would.
fn via_command(words: &[String]) -> PlumbResult<Vec<String>> {
    match words {
        [] => Err(PlumbError::invalid("via requires a command")),
        [single] if single.contains(char::is_whitespace) => shell_words::split(single)
            .map_err(|e| PlumbError::invalid(format!("invalid via command {single:?}: {e}"))),
        _ => Ok(words.to_vec()),
    }
}
