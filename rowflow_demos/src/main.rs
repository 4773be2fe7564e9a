// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Example binary for `rowflow_transforms`.
//!
//! Runs a few pipelines over in-memory sensor data and prints the results. An optional first
//! argument names a TOML file with [`EngineOptions`]. Set `RUST_LOG=debug` to see per-stage
//! row counts.

use std::error::Error;

use rowflow_core::{EngineOptions, RowSet};
use rowflow_transforms::{
    AggregateFn, AggregateSpec, AsOfSpec, BoxError, Direction, FnSink, GroupBySpec, JoinKey,
    JoinSpec, JoinType, NormalizeSpec, Operand, Pipeline, ResampleSpec, RollingSpec,
    WindowMethod,
};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let options = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading engine options from {path}");
            EngineOptions::from_toml_str(&std::fs::read_to_string(path)?)?
        }
        None => EngineOptions::default(),
    };

    // Five-minute RMS means, the way the sensor export is usually summarised.
    let resampled = Pipeline::from_rows(sensor_rows()?)
        .with_options(options.clone())
        .resample(ResampleSpec::parse(
            "Time_s[s]",
            ["RMS[A]"],
            "5T",
            WindowMethod::Mean,
        )?)
        .materialize()?;
    print_rows("resample 5T mean", &resampled);

    let rolled = Pipeline::from_rows(sensor_rows()?)
        .with_options(options.clone())
        .rolling(RollingSpec::new(["RMS[A]"], 3, WindowMethod::Mean)?)
        .normalize(vec!["RMS[A]:MinMax".parse::<NormalizeSpec>()?])
        .materialize()?;
    print_rows("rolling mean over 3 rows, RMS normalised", &rolled);

    // The phase table is read lazily, once, when the pipeline runs.
    let phases = Operand::deferred(|| -> Result<RowSet, BoxError> {
        Ok(RowSet::from_records([
            vec![("Time_s[s]", "0"), ("phase", "warmup")],
            vec![("Time_s[s]", "400"), ("phase", "load")],
        ])?)
    });
    let tagged = Pipeline::from_rows(sensor_rows()?)
        .with_options(options.clone())
        .merge_asof(
            phases,
            AsOfSpec::new("Time_s[s]", "Time_s[s]").with_direction(Direction::Backward),
        )
        .group_by(GroupBySpec::new(
            ["phase"],
            vec![
                "RMS[A]:mean".parse::<AggregateSpec>()?,
                AggregateSpec::new("RMS[A]", AggregateFn::Max),
                AggregateSpec::new("RMS[A]", AggregateFn::Count).with_output("samples"),
            ],
        ))
        .join(
            limits()?,
            JoinSpec::new(vec![JoinKey::on("phase")], JoinType::Left),
        );

    let mut printed = 0_usize;
    let mut sink = FnSink(|rows: &RowSet| -> Result<(), BoxError> {
        print_rows("per-phase summary with limits", rows);
        printed += 1;
        Ok(())
    });
    let written = tagged.write_to(&mut sink)?;
    log::info!("wrote {written} summary rows in {printed} batch(es)");
    Ok(())
}

fn sensor_rows() -> Result<RowSet, Box<dyn Error>> {
    let samples = [
        ("0", "1.20"),
        ("90", "1.35"),
        ("180", "1.10"),
        ("290", ""),
        ("310", "2.40"),
        ("420", "2.75"),
        ("505", "2.60"),
        ("615", "3.05"),
    ];
    Ok(RowSet::from_records(
        samples.map(|(t, rms)| vec![("Time_s[s]", t), ("RMS[A]", rms)]),
    )?)
}

fn limits() -> Result<RowSet, Box<dyn Error>> {
    Ok(RowSet::from_records([
        vec![("phase", "warmup"), ("limit", "1.5")],
        vec![("phase", "load"), ("limit", "3.0")],
    ])?)
}

fn print_rows(title: &str, rows: &RowSet) {
    println!("== {title} ({} rows)", rows.len());
    println!("{}", rows.columns().join("\t"));
    for row in rows {
        println!("{}", row.cells().join("\t"));
    }
}
