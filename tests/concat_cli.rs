use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn concat_timeseries() -> Result<Command> {
    Ok(Command::cargo_bin("concat_timeseries")?)
}

fn write_table(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[test]
fn concatenates_runs_per_subject() -> Result<()> {
    let temp = TempDir::new()?;
    let data = temp.path().join("derivatives");
    let out = temp.path().join("concat");

    write_table(&data.join("sub-01/func/sub-01_run-01_cleaned_timeseries.csv"), "1,2\n0.1,0.2\n")?;
    write_table(&data.join("sub-01/func/sub-01_run-02_cleaned_timeseries.csv"), "1,2\n0.3,0.4\n")?;
    write_table(&data.join("sub-02/func/sub-02_run-01_cleaned_timeseries.csv"), "1,3\n5,6\n")?;

    concat_timeseries()?
        .arg(&data)
        .arg("--output_dir")
        .arg(&out)
        .arg("-q")
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(out.join("sub-01_concatenated_timeseries.csv"))?,
        "1,2\n0.1,0.2\n0.3,0.4\n"
    );
    assert_eq!(
        fs::read_to_string(out.join("sub-02_concatenated_timeseries.csv"))?,
        "1,3\n5,6\n"
    );
    Ok(())
}

#[test]
fn excluded_runs_are_left_out() -> Result<()> {
    let temp = TempDir::new()?;
    let data = temp.path().join("derivatives");
    let out = temp.path().join("concat");

    write_table(&data.join("sub-01_run-1_cleaned_timeseries.csv"), "1\n1\n")?;
    write_table(&data.join("sub-01_run-10_cleaned_timeseries.csv"), "1\n10\n")?;
    write_table(&data.join("sub-01_run-2_cleaned_timeseries.csv"), "1\n2\n")?;

    concat_timeseries()?
        .arg(&data)
        .arg("--output-dir")
        .arg(&out)
        .args(["--exclude-runs", "run-1,run-2", "-q"])
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(out.join("sub-01_concatenated_timeseries.csv"))?,
        "1\n10\n"
    );
    Ok(())
}

#[test]
fn mismatched_columns_are_padded_with_nan() -> Result<()> {
    let temp = TempDir::new()?;
    let data = temp.path().join("derivatives");
    let out = temp.path().join("concat");

    write_table(&data.join("sub-07_run-1_timeseries.csv"), "1,2\n1,2\n")?;
    write_table(&data.join("sub-07_run-2_timeseries.csv"), "2,3\n5,6\n")?;

    concat_timeseries()?
        .arg(&data)
        .arg("-o")
        .arg(&out)
        .args(["--output-format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Subjects written: 1"));

    assert_eq!(
        fs::read_to_string(out.join("sub-07_concatenated_timeseries.csv"))?,
        "1,2,3\n1,2,NaN\nNaN,5,6\n"
    );
    Ok(())
}

#[test]
fn no_tables_exits_seven() -> Result<()> {
    let temp = TempDir::new()?;

    concat_timeseries()?
        .arg(temp.path())
        .arg("--output_dir")
        .arg(temp.path().join("concat"))
        .arg("-q")
        .assert()
        .code(7);
    Ok(())
}
