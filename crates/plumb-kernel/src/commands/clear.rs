//! `clear`: delete pipes and pipelines, or reset a pipe's settings.

use async_trait::async_trait;

use plumb_types::{CommandArgs, CommandResponse, PipeMode, PlumbError, PlumbResult};

use super::{Command, CommandContext, CommandSchema};

/// Clear command.
pub struct Clear;

#[async_trait]
impl Command for Clear {
    fn name(&self) -> &str {
        "clear"
    }

    fn schema(&self) -> CommandSchema {
        CommandSchema::new("clear", "reset plumber and pipe state")
            .pattern("clear plumb [pipeline]...")
            .pattern("clear pipe [pipe]")
            .pattern("clear pipe <pipe> <mode,>")
            .pattern("clear pipe <pipe> <log,>")
            .pattern("clear pipe <pipe> <via,>")
            .long(
                "\"clear plumb\" tears down pipelines. With endpoints, only the matching \
pipeline goes and named pipes left without readers or writers are deleted. \
Without, every pipeline and pipe in this namespace is removed.

\"clear pipe\" deletes one pipe, or every pipe in this namespace. With mode, \
log or via it resets that setting to all, false or none instead.",
            )
    }

    async fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<CommandResponse> {
        if args.has("plumb") {
            clear_plumb(ctx, args).await?;
        } else if args.has("pipe") {
            clear_pipe(ctx, args)?;
        } else {
            return Err(PlumbError::invalid("clear requires plumb or pipe"));
        }
        Ok(CommandResponse::empty())
    }
}

async fn clear_plumb(ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<()> {
    let pipeline = args.get_list("pipeline");
    if pipeline.is_empty() {
        ctx.plumber.pipeline_delete_namespace(&ctx.namespace).await;
        return Ok(());
    }
    ctx.plumber.pipeline_delete(&ctx.namespace, pipeline).await
}

fn clear_pipe(ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<()> {
    let resets = args.has("mode") || args.has("log") || args.has("via");

    let Some(name) = args.get("pipe") else {
        if resets {
            return Err(PlumbError::invalid("no pipe given"));
        }
        ctx.registry().delete_namespace(&ctx.namespace);
        return Ok(());
    };
    let name = ctx.qualify(name);

    if !resets {
        return ctx.registry().delete(&name);
    }

    let pipe = ctx
        .registry()
        .get(&name)
        .ok_or_else(|| PlumbError::invalid(format!("no such pipe: {name}")))?;
    if args.has("mode") {
        pipe.set_mode(PipeMode::All);
    }
    if args.has("log") {
        pipe.set_log(false);
    }
    if args.has("via") {
        pipe.set_via(Vec::new());
    }
    Ok(())
}
