//! Integration tests for the pipe, plumb and clear commands.
//!
//! Tests verify:
//! - pipe sends, changes settings and renders status tables
//! - Invalid arguments come back as validation errors
//! - clear deletes or resets, scoped to the caller's namespace
//! - plumb wires and lists pipelines

use std::sync::Arc;
use std::time::Duration;

use plumb_kernel::{
    CommandArgs, CommandContext, CommandRegistry, CommandResponse, PipeMode, PlumbError, PlumbResult,
    Plumber, Registry,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    commands: CommandRegistry,
    ctx: CommandContext,
}

impl Harness {
    fn new(namespace: &str) -> Self {
        let plumber = Arc::new(Plumber::new(Registry::new()));
        Self {
            commands: CommandRegistry::with_builtins(),
            ctx: CommandContext::new(namespace, plumber),
        }
    }

    /// Same engine, different namespace.
    fn in_namespace(&self, namespace: &str) -> Self {
        Self {
            commands: CommandRegistry::with_builtins(),
            ctx: CommandContext::new(namespace, self.ctx.plumber.clone()),
        }
    }

    fn registry(&self) -> &Registry {
        self.ctx.registry()
    }

    async fn run(&self, name: &str, args: CommandArgs) -> PlumbResult<CommandResponse> {
        self.commands.execute(name, &self.ctx, &args).await
    }
}

fn send(pipe: &str, data: &str) -> CommandArgs {
    CommandArgs::new().flag("send").string("pipe", pipe).string("data", data)
}

// ============================================================================
// pipe
// ============================================================================

#[tokio::test]
async fn test_pipe_send_creates_and_counts() {
    let h = Harness::new("ns");

    h.run("pipe", send("alpha", "hello")).await.unwrap();
    h.run("pipe", send("alpha", "again")).await.unwrap();

    let pipe = h.registry().get("ns//alpha").expect("send should create the pipe");
    assert_eq!(pipe.num_messages(), 2);
    assert_eq!(pipe.last(), "again");
}

#[tokio::test]
async fn test_pipe_send_reaches_reader() {
    let h = Harness::new("ns");
    let mut reader = h.registry().get_or_create("ns//alpha").attach_reader().unwrap();

    h.run("pipe", send("alpha", "hello pipes")).await.unwrap();
    assert_eq!(reader.recv().await.as_deref(), Some("hello pipes"));
}

#[tokio::test]
async fn test_pipe_mode_and_log() {
    let h = Harness::new("ns");

    let args = CommandArgs::new().flag("name").string("pipe", "alpha").flag("mode").flag("random");
    h.run("pipe", args).await.unwrap();
    let args = CommandArgs::new().flag("name").string("pipe", "alpha").flag("log").flag("true");
    h.run("pipe", args).await.unwrap();

    let pipe = h.registry().get("ns//alpha").unwrap();
    assert_eq!(pipe.mode(), PipeMode::Random);
    assert!(pipe.log_enabled());

    let args = CommandArgs::new().flag("name").string("pipe", "alpha").flag("log").flag("false");
    h.run("pipe", args).await.unwrap();
    assert!(!pipe.log_enabled());
}

#[tokio::test]
async fn test_pipe_via_splits_quoted_command() {
    let h = Harness::new("ns");

    let args = CommandArgs::new()
        .flag("send")
        .string("pipe", "alpha")
        .flag("via")
        .list("command", ["sed -u 's/a/b/'"]);
    h.run("pipe", args).await.unwrap();

    let pipe = h.registry().get("ns//alpha").unwrap();
    assert_eq!(pipe.via(), vec!["sed", "-u", "s/a/b/"]);
}

#[tokio::test]
async fn test_pipe_via_without_command_is_rejected() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().flag("send").string("pipe", "alpha").flag("via");
    let err = h.run("pipe", args).await.unwrap_err();
    assert!(matches!(err, PlumbError::Validation(_)));
}

#[tokio::test]
async fn test_pipe_status_table_scoped_to_namespace() {
    let h = Harness::new("ns");
    h.run("pipe", send("alpha", "  first message  ")).await.unwrap();
    h.run("pipe", send("other//beta", "elsewhere")).await.unwrap();

    let table = h.run("pipe", CommandArgs::new()).await.unwrap();
    assert_eq!(
        table.header,
        vec!["name", "mode", "readers", "writers", "count", "via", "previous"]
    );
    assert_eq!(
        table.rows,
        vec![vec!["ns//alpha", "all", "0", "0", "1", "", "first message"]]
    );

    let rendered = table.to_table_string();
    assert!(rendered.starts_with("name"));
    assert!(rendered.contains("ns//alpha"));
    assert!(!rendered.contains("other//beta"));
}

#[tokio::test]
async fn test_pipe_single_status_row() {
    let h = Harness::new("ns");
    h.run("pipe", send("alpha", "x")).await.unwrap();

    let args = CommandArgs::new().flag("name").string("pipe", "alpha");
    let table = h.run("pipe", args).await.unwrap();
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0][0], "ns//alpha");
}

#[tokio::test]
async fn test_pipe_truncate_shortens_previous_column_only() {
    let h = Harness::new("ns");
    h.run("pipe", send("alpha", "a rather long message")).await.unwrap();

    let args = CommandArgs::new().flag("truncate").string("length", "8");
    let table = h.run("pipe", args).await.unwrap();
    assert_eq!(table.rows[0][6], "a rather");
    assert_eq!(h.registry().get("ns//alpha").unwrap().last(), "a rather long message");
}

#[tokio::test]
async fn test_pipe_truncate_rejects_bad_length() {
    let h = Harness::new("ns");
    for bad in ["-1", "many", ""] {
        let args = CommandArgs::new().flag("truncate").string("length", bad);
        let err = h.run("pipe", args).await.unwrap_err();
        assert_eq!(err, PlumbError::invalid(format!("invalid truncation length: {bad}")));
    }
}

// ============================================================================
// clear pipe
// ============================================================================

#[tokio::test]
async fn test_clear_pipe_deletes_one() {
    let h = Harness::new("ns");
    h.run("pipe", send("alpha", "x")).await.unwrap();
    h.run("pipe", send("beta", "x")).await.unwrap();

    let args = CommandArgs::new().flag("pipe").string("pipe", "alpha");
    h.run("clear", args).await.unwrap();

    assert_eq!(h.registry().names(), vec!["ns//beta"]);
}

#[tokio::test]
async fn test_clear_missing_pipe_is_not_found() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().flag("pipe").string("pipe", "ghost");
    let err = h.run("clear", args).await.unwrap_err();
    assert!(matches!(err, PlumbError::NotFound(_)));
}

#[tokio::test]
async fn test_clear_pipe_without_name_clears_namespace_only() {
    let h = Harness::new("ns");
    h.run("pipe", send("alpha", "x")).await.unwrap();
    h.run("pipe", send("other//beta", "x")).await.unwrap();

    h.run("clear", CommandArgs::new().flag("pipe")).await.unwrap();
    assert_eq!(h.registry().names(), vec!["other//beta"]);
}

#[tokio::test]
async fn test_clear_pipe_resets_settings() {
    let h = Harness::new("ns");
    let pipe = h.registry().get_or_create("ns//alpha");
    pipe.set_mode(PipeMode::RoundRobin);
    pipe.set_log(true);
    pipe.set_via(vec!["cat".into()]);

    for flag in ["mode", "log", "via"] {
        let args = CommandArgs::new().flag("pipe").string("pipe", "alpha").flag(flag);
        h.run("clear", args).await.unwrap();
    }

    assert_eq!(pipe.mode(), PipeMode::All);
    assert!(!pipe.log_enabled());
    assert!(pipe.via().is_empty());
    assert!(h.registry().contains("ns//alpha"));
}

#[tokio::test]
async fn test_clear_reset_on_missing_pipe_is_rejected() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().flag("pipe").string("pipe", "ghost").flag("mode");
    let err = h.run("clear", args).await.unwrap_err();
    assert_eq!(err, PlumbError::invalid("no such pipe: ns//ghost"));
    assert!(h.registry().is_empty());
}

#[tokio::test]
async fn test_clear_requires_target() {
    let h = Harness::new("ns");
    let err = h.run("clear", CommandArgs::new()).await.unwrap_err();
    assert!(matches!(err, PlumbError::Validation(_)));
}

// ============================================================================
// plumb and clear plumb
// ============================================================================

#[tokio::test]
async fn test_plumb_and_list() {
    let h = Harness::new("ns");

    let args = CommandArgs::new().string("src", "alpha").list("dst", ["beta"]);
    h.run("plumb", args).await.unwrap();

    let table = h.run("plumb", CommandArgs::new()).await.unwrap();
    assert_eq!(table.header, vec!["pipeline"]);
    assert_eq!(table.rows, vec![vec!["ns//alpha -> ns//beta"]]);

    // another namespace does not see it
    let other = h.in_namespace("elsewhere");
    let table = other.run("plumb", CommandArgs::new()).await.unwrap();
    assert!(table.rows.is_empty());
}

#[tokio::test]
async fn test_plumb_requires_destination() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().string("src", "alpha");
    let err = h.run("plumb", args).await.unwrap_err();
    assert!(matches!(err, PlumbError::Validation(_)));
    assert!(h.registry().is_empty());
}

#[tokio::test]
async fn test_plumbed_message_flows() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().string("src", "alpha").list("dst", ["beta"]);
    h.run("plumb", args).await.unwrap();

    let mut reader = h.registry().get("ns//beta").unwrap().attach_reader().unwrap();
    h.run("pipe", send("alpha", "through")).await.unwrap();

    let got = tokio::time::timeout(Duration::from_secs(5), reader.recv())
        .await
        .expect("timed out");
    assert_eq!(got.as_deref(), Some("through"));
}

#[tokio::test]
async fn test_clear_plumb_one_pipeline() {
    let h = Harness::new("ns");
    for dst in ["beta", "gamma"] {
        let args = CommandArgs::new().string("src", "alpha").list("dst", [dst]);
        h.run("plumb", args).await.unwrap();
    }

    let args = CommandArgs::new().flag("plumb").list("pipeline", ["alpha", "beta"]);
    h.run("clear", args).await.unwrap();

    assert_eq!(h.registry().names(), vec!["ns//alpha", "ns//gamma"]);
    let table = h.run("plumb", CommandArgs::new()).await.unwrap();
    assert_eq!(table.rows, vec![vec!["ns//alpha -> ns//gamma"]]);
}

#[tokio::test]
async fn test_clear_plumb_everything_in_namespace() {
    let h = Harness::new("ns");
    let other = h.in_namespace("keep");

    let args = CommandArgs::new().string("src", "alpha").list("dst", ["beta"]);
    h.run("plumb", args.clone()).await.unwrap();
    other.run("plumb", args).await.unwrap();

    h.run("clear", CommandArgs::new().flag("plumb")).await.unwrap();

    assert_eq!(h.registry().names(), vec!["keep//alpha", "keep//beta"]);
    let table = other.run("plumb", CommandArgs::new()).await.unwrap();
    assert_eq!(table.rows, vec![vec!["keep//alpha -> keep//beta"]]);
}

#[tokio::test]
async fn test_clear_plumb_unknown_is_not_found() {
    let h = Harness::new("ns");
    let args = CommandArgs::new().flag("plumb").list("pipeline", ["ghost"]);
    let err = h.run("clear", args).await.unwrap_err();
    assert_eq!(err, PlumbError::NotFound("ns//ghost".into()));
}
