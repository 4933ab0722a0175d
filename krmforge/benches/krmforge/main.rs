use std::path::Path;

use krmforge::{Builder, FsLoader, ResourceMap};

fn main() {
    divan::main();
}

async fn build_case(case: &str) -> ResourceMap {
    let loader = FsLoader::new(Path::new("tests/krmforge/testdata").join(case));
    Builder::default()
        .build(&loader, Path::new(""))
        .await
        .unwrap()
}

#[divan::bench]
#[tokio::main]
async fn build_overlay() -> ResourceMap {
    build_case("prefix-suffix-namespace").await
}

#[divan::bench]
#[tokio::main]
async fn build_generators() -> ResourceMap {
    build_case("generators").await
}

#[divan::bench]
#[tokio::main]
async fn build_patches() -> ResourceMap {
    build_case("list-merge-images").await
}
