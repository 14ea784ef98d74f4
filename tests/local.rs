// End-to-end runs over a local directory into a CSV file.

use anyhow::Result;
use linesieve::config::{Backend, PickerArgs};
use linesieve::io::cloud::LocalObjectIO;
use linesieve::output::CsvSink;
use linesieve::runner::{PartitionSource, RunContext, Runner};
use clap::Parser;
use std::fs;
use tempfile::tempdir;

fn write_corpus(dir: &std::path::Path) -> Result<()> {
    fs::create_dir_all(dir.join("2024"))?;
    fs::write(
        dir.join("2024/a.jsonl"),
        "{\"id\":\"a1\",\"content\":\"ももクロのライブに行った話\"}\n{\"id\":\"a2\",\"content\":\"関係ない話題\"}\n",
    )?;
    fs::write(
        dir.join("2024/b.jsonl"),
        "{\"id\":\"b1\",\"text\":\"ももクロ\\nの新曲について\"}\n",
    )?;
    Ok(())
}

fn parse(args: &[&str]) -> Result<PickerArgs> {
    let mut argv = vec!["linesieve"];
    argv.extend_from_slice(args);
    Ok(PickerArgs::try_parse_from(argv)?)
}

#[test]
fn test_local_directory_to_csv() -> Result<()> {
    let corpus = tempdir()?;
    write_corpus(corpus.path())?;
    let out = tempdir()?;
    let outfile = out.path().join("picked.csv");

    let args = parse(&[
        "--local-dir",
        corpus.path().to_str().unwrap_or_default(),
        "--min-len",
        "5",
        "--mode",
        "all",
        "--chunk",
        "16",
        "--outfile",
        outfile.to_str().unwrap_or_default(),
    ])?;
    let config = args.validate()?;
    let Backend::Local { root } = &config.backend else {
        panic!("expected a local backend");
    };
    assert_eq!(config.source, PartitionSource::Listing { prefix: None });

    let store = LocalObjectIO::new(root.clone());
    let runner = Runner::new(&store, config.bucket.clone(), config.matcher.clone(), config.policy)
        .with_source(config.source.clone())
        .with_chunk_size(config.chunk_size);

    for _ in 0..2 {
        let mut sink = CsvSink::open(&config.outfile, config.overwrite)?;
        let summary = runner.run(&mut RunContext::new(config.seed), &mut sink)?;
        assert_eq!(summary.rows_written, 2);
    }

    let written = fs::read_to_string(&outfile)?;
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "id,text,char_len",
            "a1,ももクロのライブに行った話,13",
            "b1,ももクロ の新曲について,12",
            "a1,ももクロのライブに行った話,13",
            "b1,ももクロ の新曲について,12",
        ]
    );
    Ok(())
}

#[test]
fn test_local_explicit_keys() -> Result<()> {
    let corpus = tempdir()?;
    write_corpus(corpus.path())?;

    let args = parse(&[
        "--local-dir",
        corpus.path().to_str().unwrap_or_default(),
        "--key",
        "2024/b.jsonl",
        "--min-len",
        "1",
    ])?;
    let config = args.validate()?;
    assert_eq!(config.source, PartitionSource::Keys(vec!["2024/b.jsonl".to_string()]));

    let store = LocalObjectIO::new(corpus.path());
    let runner = Runner::new(&store, config.bucket.clone(), config.matcher.clone(), config.policy)
        .with_source(config.source.clone());
    let mut sink = linesieve::VecSink::new();
    runner.run(&mut RunContext::new(config.seed), &mut sink)?;
    assert_eq!(sink.rows.len(), 1);
    assert_eq!(sink.rows[0].id, "b1");
    Ok(())
}
