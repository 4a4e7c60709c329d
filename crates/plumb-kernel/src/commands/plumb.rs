//! `plumb`: wire pipes and programs into pipelines, or list them.

use async_trait::async_trait;

use plumb_types::{CommandArgs, CommandResponse, PlumbError, PlumbResult};

use super::{Command, CommandContext, CommandSchema};

/// Plumb command.
pub struct Plumb;

#[async_trait]
impl Command for Plumb {
    fn name(&self) -> &str {
        "plumb"
    }

    fn schema(&self) -> CommandSchema {
        CommandSchema::new("plumb", "plumb I/O between pipes and external programs")
            .pattern("plumb <src> <dst>...")
            .pattern("plumb")
            .long(
                "Create pipelines of named pipes and external programs. Messages are \
lines of text passed over standard I/O. To pass pipe \"foo\" through sed into \
pipe \"bar\":

\tplumb foo \"sed -u s/foo/moo/\" bar

Endpoints whose first word is not an executable on $PATH are named pipes.
Plumbing an existing pipe again adds a branch:

\tplumb a b
\tplumb a c

Without arguments, lists the pipelines in this namespace.",
            )
    }

    async fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> PlumbResult<CommandResponse> {
        let Some(src) = args.get("src") else {
            let rows = ctx
                .plumber
                .pipelines_in(&ctx.namespace)
                .into_iter()
                .map(|p| vec![p])
                .collect();
            return Ok(CommandResponse::table(["pipeline"], rows));
        };

        let dst = args.get_list("dst");
        if dst.is_empty() {
            return Err(PlumbError::invalid("plumb requires at least one destination"));
        }

        let endpoints: Vec<String> = std::iter::once(src.to_string())
            .chain(dst.iter().cloned())
            .collect();
        ctx.plumber.plumb(&ctx.namespace, &endpoints)?;
        Ok(CommandResponse::empty())
    }
}
