use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use image::{ImageFormat, Rgb, RgbImage};
use predicates::prelude::*;
use rstest::*;
use serde_json::Value;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 包含红、蓝两张图片以及一个无法解码的 png 文件的目录
#[fixture]
fn dataset() -> assert_fs::TempDir {
    let dir = assert_fs::TempDir::new().unwrap();
    RgbImage::from_pixel(40, 20, Rgb([220, 20, 20]))
        .save_with_format(dir.child("red.png").path(), ImageFormat::Png)
        .unwrap();
    dir.child("nested").create_dir_all().unwrap();
    RgbImage::from_pixel(20, 40, Rgb([20, 40, 220]))
        .save_with_format(dir.child("nested/blue.png").path(), ImageFormat::Png)
        .unwrap();
    dir.child("broken.png").write_binary(b"not an image").unwrap();
    dir.child("notes.txt").write_str("ignored").unwrap();
    dir
}

#[rstest]
fn analyze_directory(dataset: assert_fs::TempDir) -> Result<()> {
    cargo_run!("insightd", "analyze", dataset.path())
        .success()
        .stdout(predicate::str::contains("red.png"))
        .stdout(predicate::str::contains("a wide image mostly red"))
        .stdout(predicate::str::contains("a tall image mostly blue"))
        .stdout(predicate::str::contains("[ERR]"))
        .stdout(predicate::str::contains("notes.txt").not());
    Ok(())
}

#[rstest]
fn analyze_and_search(dataset: assert_fs::TempDir) -> Result<()> {
    let output = cargo_run!(
        "insightd",
        "analyze",
        dataset.path(),
        "--query",
        "blue",
        "--top-k",
        "1",
        "--output-format",
        "json"
    )
    .success()
    .get_output()
    .stdout
    .clone();

    let output: Value = serde_json::from_slice(&output)?;
    assert_eq!(output["images"].as_array().unwrap().len(), 3);
    let search = output["search"].as_array().unwrap();
    assert_eq!(search.len(), 1);
    assert!(search[0]["path"].as_str().unwrap().ends_with("blue.png"));
    Ok(())
}

#[rstest]
fn disabled_embedding_still_analyzes(dataset: assert_fs::TempDir) -> Result<()> {
    cargo_run!("insightd", "analyze", dataset.child("red.png").path(), "--disable", "embedding")
        .success()
        .stdout(predicate::str::contains("embedding: embedding model not initialized"));
    Ok(())
}

#[test]
fn analyze_requires_path() -> Result<()> {
    cargo_run!("insightd", "analyze").failure();
    Ok(())
}
