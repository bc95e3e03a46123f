use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use docrag_cli::{App, Cli, Command};
use docrag_core::config::Settings;
use docrag_core::error::Error;
use docrag_embed::{EmbedderHandle, FakeEmbedder};

fn app_in(root: &std::path::Path) -> App {
    std::env::remove_var("VECTOR_BACKEND");
    App::new(Settings::default(), root).with_embedder(EmbedderHandle::ready(Arc::new(FakeEmbedder::new(64))))
}

fn run(app: &App, command: Command) -> anyhow::Result<String> {
    let mut out = Vec::new();
    app.run(command, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn parses_subcommands() {
    let cli = Cli::try_parse_from(["docrag", "-v", "ask", "What is X?", "-k", "3", "--show-context"]).expect("parse");
    assert_eq!(cli.verbose, 1);
    assert_eq!(
        cli.command,
        Command::Ask { question: "What is X?".into(), top_k: NonZeroUsize::new(3), show_context: true }
    );

    let cli = Cli::try_parse_from(["docrag", "index", "a.pdf", "docs", "--no-copy"]).expect("parse");
    assert_eq!(
        cli.command,
        Command::Index { paths: vec![PathBuf::from("a.pdf"), PathBuf::from("docs")], no_copy: true }
    );
    assert!(Cli::try_parse_from(["docrag", "index"]).is_err());
}

#[test]
fn zero_top_k_is_a_usage_error() {
    assert!(Cli::try_parse_from(["docrag", "search", "pumps", "-k", "0"]).is_err());
    assert!(Cli::try_parse_from(["docrag", "ask", "What is X?", "--top-k", "0"]).is_err());
    assert!(Cli::try_parse_from(["docrag", "search", "pumps", "-k", "2"]).is_ok());
}

#[test]
fn index_search_list_reset() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let inbox = tmp.path().join("inbox");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("garden.txt"), "Tomatoes need full sun.\n\nWater deeply twice a week.\u{c}Compost in autumn.")?;
    std::fs::write(inbox.join("notes.md"), "ignored")?;
    let app = app_in(tmp.path());

    let indexed = run(&app, Command::Index { paths: vec![inbox.clone()], no_copy: false })?;
    assert!(indexed.contains("garden.txt: 2 pages, 2 chunks"), "{indexed}");
    assert!(indexed.contains("2 chunks indexed"));
    assert!(app.pdf_dir().join("garden.txt").is_file());

    let listed = run(&app, Command::List)?;
    assert_eq!(listed.trim(), app.pdf_dir().join("garden.txt").display().to_string());

    let hits = run(&app, Command::Search { query: "Compost in autumn.".into(), top_k: NonZeroUsize::new(1) })?;
    assert!(hits.contains("[garden.txt | p.2 | c0] Compost in autumn."), "{hits}");

    run(&app, Command::Reset)?;
    assert_eq!(run(&app, Command::Search { query: "sun".into(), top_k: None })?.trim(), "no results");
    Ok(())
}

#[test]
fn chunk_preview_lists_tags() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let doc = tmp.path().join("one.txt");
    std::fs::write(&doc, "Alpha beta gamma.")?;
    let out = run(&app_in(tmp.path()), Command::Chunk { file: doc })?;
    assert!(out.starts_with("[one.txt | p.1 | c0] (3 words) Alpha beta gamma."));
    assert!(out.ends_with("1 chunks from 1 pages\n"));
    Ok(())
}

#[test]
fn ask_without_credentials_fails_fast() {
    std::env::remove_var("XAI_API_KEY");
    let tmp = tempfile::tempdir().expect("tmp");
    let app = app_in(tmp.path());
    let err = run(&app, Command::Ask { question: "anything".into(), top_k: None, show_context: false })
        .expect_err("no key");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidConfig(_))));
    assert!(!app.data_dir().exists());
}
