//! ProEdit Studio - headless timeline replay
//!
//! Runs an edit script against an in-memory engine and prints the resulting
//! timeline as JSON.
//!
//! ```text
//! proedit <script.json> [--check] [--history <out.json>] [--groups]
//! ```

mod script;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use proedit_timeline::{Role, RoleValue, TimelineModel};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use script::{Report, Runner, Script};

struct Args {
    script: PathBuf,
    check: bool,
    history: Option<PathBuf>,
    groups: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut script = None;
    let mut check = false;
    let mut history = None;
    let mut groups = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--check" => check = true,
            "--groups" => groups = true,
            "--history" => {
                let path = args.next().context("--history needs a path")?;
                history = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            path => script = Some(PathBuf::from(path)),
        }
    }
    let Some(script) = script else {
        bail!("usage: proedit <script.json> [--check] [--history <out.json>] [--groups]");
    };
    Ok(Args {
        script,
        check,
        history,
        groups,
    })
}

#[derive(Serialize)]
struct Summary {
    duration: i64,
    report: Report,
    tracks: Vec<TrackSummary>,
    live_producers: usize,
}

#[derive(Serialize)]
struct TrackSummary {
    name: String,
    audio: bool,
    items: Vec<ItemSummary>,
}

#[derive(Serialize)]
struct ItemSummary {
    id: String,
    start: i64,
    duration: i64,
    grouped: bool,
}

fn summarize(model: &TimelineModel, report: Report, live_producers: usize) -> Summary {
    let mut tracks = Vec::new();
    for track in model.tracks().iter().rev() {
        let Some(track_index) = model.track_index(track.id()) else {
            continue;
        };
        let items = (0..model.row_count(Some(&track_index)))
            .filter_map(|row| model.index(row, Some(&track_index)))
            .map(|index| ItemSummary {
                id: index.id.to_string(),
                start: int(model.data(&index, Role::Start)),
                duration: int(model.data(&index, Role::Duration)),
                grouped: matches!(model.data(&index, Role::Grouped), Some(RoleValue::Bool(true))),
            })
            .collect();
        tracks.push(TrackSummary {
            name: track.name().to_string(),
            audio: track.is_audio(),
            items,
        });
    }
    Summary {
        duration: model.duration(),
        report,
        tracks,
        live_producers,
    }
}

fn int(value: Option<RoleValue>) -> i64 {
    match value {
        Some(RoleValue::Int(v)) => v,
        _ => 0,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    info!("ProEdit replay starting...");

    let script = Script::load(&args.script)?;
    let mut runner = Runner::new(&script, args.check)?;
    let report = runner.run(&script.steps)?;
    info!(applied = report.applied, refused = report.refused, "script finished");

    if let Some(path) = &args.history {
        runner
            .model
            .export_history()?
            .save_to_file(path)
            .with_context(|| format!("cannot write history to {}", path.display()))?;
        info!(path = %path.display(), "history saved");
    }

    if args.groups {
        println!("{}", runner.model.groups_to_json()?);
    }

    let summary = summarize(&runner.model, report, runner.engine().live_producers());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
