//! demo - end-to-end synthetic run of the zone counter

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use zone_counter::config::{parse_host_port, SnapshotSettings};
use zone_counter::detect::{write_replay, DetectorKind, ReplayRecord};
use zone_counter::ingest::{SyntheticConfig, SyntheticSource};
use zone_counter::input::{Command, ScriptedCommands};
use zone_counter::render::{FanoutRenderer, LogRenderer, OverlayRenderer};
use zone_counter::{Detection, Pipeline, PipelineConfig, Point, Zone, ZoneStore};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Number of moving figures.
    #[arg(long, default_value_t = 2)]
    figures: u32,
    /// Output directory for zones, CSV, replay file and snapshots.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
    /// Write an annotated snapshot every N frames (0 disables).
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,
    /// Also stream metrics over OSC to HOST:PORT.
    #[arg(long)]
    osc: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let out_dir = args.out.clone();
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output dir {}", out_dir.display()))?;

    stage("synthesize scene");
    let scene = SyntheticConfig {
        name: "demo".to_string(),
        frames: Some(args.frames),
        width: WIDTH,
        height: HEIGHT,
        figures: args.figures,
        ..SyntheticConfig::default()
    };
    let mut source = SyntheticSource::new(scene);

    stage("record ground-truth detections");
    let replay_path = out_dir.join("detections.jsonl");
    let records: Vec<ReplayRecord> = (0..args.frames)
        .map(|i| {
            let detections: Vec<Detection> = source
                .figure_boxes(i)
                .into_iter()
                .map(|b| Detection::new(b.x, b.y, b.width, b.height, 1.0))
                .collect();
            ReplayRecord::new(i, &detections)
        })
        .collect();
    write_replay(&replay_path, &records)?;

    stage("seed zone file");
    let zones_path = out_dir.join("zones.json");
    let half = (WIDTH / 2) as i32;
    ZoneStore::new(&zones_path).save(&[Zone::new(
        "Left",
        [
            Point::new(0, 0),
            Point::new(half, 0),
            Point::new(half, HEIGHT as i32),
            Point::new(0, HEIGHT as i32),
        ],
    )])?;

    let mut cfg = PipelineConfig {
        source: "stub://demo".to_string(),
        zones_path: zones_path.clone(),
        csv_path: Some(out_dir.join("occupancy.csv")),
        snapshots: (args.snapshot_every > 0).then(|| SnapshotSettings {
            dir: out_dir.join("snapshots"),
            every: args.snapshot_every,
        }),
        ..PipelineConfig::default()
    };
    cfg.detector.kind = DetectorKind::Replay;
    cfg.detector.replay_path = Some(replay_path.clone());
    if let Some(target) = &args.osc {
        let (host, port) = parse_host_port(target).context("--osc")?;
        cfg.osc.enabled = true;
        cfg.osc.host = host;
        cfg.osc.port = port;
    }
    cfg.validate()?;

    stage("run pipeline");
    let mut pipeline = Pipeline::from_config(&cfg);
    let draw_at = args.frames / 3;
    let mut script: Vec<(u64, Command)> = [
        (half, 0),
        (WIDTH as i32, 0),
        (WIDTH as i32, HEIGHT as i32),
        (half, HEIGHT as i32),
    ]
    .into_iter()
    .map(|(x, y)| (draw_at, Command::AddPoint { x, y }))
    .collect();
    script.push((draw_at, Command::FinalizeZone));
    script.push((draw_at + 1, Command::SaveZones));
    script.push((draw_at + 2, Command::LoadZones));
    let mut commands = ScriptedCommands::new(script);

    let mut renderers: Vec<Box<dyn zone_counter::Renderer>> = vec![Box::new(LogRenderer::new())];
    if let Some(snapshots) = &cfg.snapshots {
        renderers.push(Box::new(OverlayRenderer::new(
            &snapshots.dir,
            snapshots.every,
        )?));
    }
    let mut renderer = FanoutRenderer::new(renderers);
    let summary = pipeline.run(
        &mut source,
        &mut commands,
        &mut renderer,
        &AtomicBool::new(false),
    );

    println!("demo summary:");
    println!("  frames processed: {}", summary.frames_processed);
    println!("  detections: {}", summary.total_detections);
    println!("  peak people: {}", summary.peak_people);
    println!("  mean motion: {:.2}%", summary.mean_motion);
    println!("  zones: {}", summary.zones);
    println!("  zones file: {}", zones_path.display());
    println!("  replay file: {}", replay_path.display());
    if let Some(csv) = &cfg.csv_path {
        println!("  csv: {}", csv.display());
    }
    println!("next steps:");
    println!(
        "  cargo run --bin zone_counter -- --source stub://demo?frames={} --zones {} --detector replay --replay {}",
        args.frames,
        zones_path.display(),
        replay_path.display()
    );
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
