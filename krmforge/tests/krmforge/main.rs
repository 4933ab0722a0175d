use std::path::Path;

use anyhow::Context;
use krmforge::{Builder, FsLoader};

datatest_stable::harness! {
    { test = test, root = "tests/krmforge/testdata", pattern = r".*/kustomization.yaml$" },
}

// Layers that only serve as bases are named `kustomization.yml` so they are not picked up
// as cases of their own.
fn test(path: &Path) -> datatest_stable::Result<()> {
    let dir = path.parent().context("case has no directory")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let loader = FsLoader::new(dir);
    match runtime.block_on(Builder::default().build(&loader, Path::new(""))) {
        Ok(resources) => snapshot(&dir.join("expected.yaml"), &resources.to_string())?,
        Err(err) => {
            eprintln!("Error building kustomization at {}: {err}", path.display());
            snapshot(&dir.join("expected.stderr"), &format!("{err}\n"))?;
        }
    }
    Ok(())
}

fn snapshot(path: &Path, actual: &str) -> datatest_stable::Result<()> {
    if !path.exists() || std::env::var("UPDATE_SNAPSHOTS").is_ok() {
        std::fs::write(path, actual).context("writing snapshot")?;
        return Ok(());
    }

    let expected = std::fs::read_to_string(path).context("reading snapshot")?;
    let chunks = dissimilar::diff(&expected, actual);
    if chunks
        .iter()
        .all(|chunk| matches!(chunk, dissimilar::Chunk::Equal(_)))
    {
        return Ok(());
    }

    eprintln!("Snapshot mismatch for {}:\n{}", path.display(), format_chunks(chunks));
    Err(format!("Snapshot mismatch for {}", path.display()).into())
}

fn format_chunks(chunks: Vec<dissimilar::Chunk>) -> String {
    let mut buf = String::new();
    for chunk in chunks {
        let formatted = match chunk {
            dissimilar::Chunk::Equal(text) => text.into(),
            dissimilar::Chunk::Delete(text) => format!("\x1b[4m\x1b[31m{text}\x1b[0m"),
            dissimilar::Chunk::Insert(text) => format!("\x1b[4m\x1b[32m{text}\x1b[0m"),
        };
        buf.push_str(&formatted);
    }
    buf
}
