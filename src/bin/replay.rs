use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use motion_fusion_rs::types::UNKNOWN;
use motion_fusion_rs::{
    Acceleration, Attitude, BaroSample, FixSample, FusionEvent, InertialSample, Navigator,
    NavigatorConfig, TickInput, TrackSource,
};

#[derive(Parser, Debug)]
struct Args {
    /// Path to sensor_log_*.json[.gz]
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes sensor_log_*.json[.gz])
    #[arg(long)]
    dir: Option<PathBuf>,

    /// JSON file with navigator settings (partial files are fine)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the velocity blend scale
    #[arg(long)]
    velocity_blend_scale: Option<f64>,

    /// Override the stationary threshold (g)
    #[arg(long)]
    zupt_threshold: Option<f64>,

    /// Override the signal-loss timeout (s)
    #[arg(long)]
    signal_timeout: Option<f64>,

    /// Maximum points in the decimated track
    #[arg(long, default_value = "500")]
    max_points: usize,

    /// Include every mode transition event in the output
    #[arg(long, default_value_t = false)]
    events: bool,
}

#[derive(Deserialize)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct AttitudeRecord {
    roll_rad: f64,
    pitch_rad: f64,
    yaw_rad: f64,
}

#[derive(Deserialize, Default)]
struct BarometerRecord {
    #[serde(default)]
    relative_altitude_m: Option<f64>,
}

#[derive(Deserialize, Default)]
struct Sensors {
    #[serde(default)]
    user_acceleration: Option<Vec3>,
    #[serde(default)]
    attitude: Option<AttitudeRecord>,
    #[serde(default)]
    barometer: Option<BarometerRecord>,
}

#[derive(Deserialize)]
struct RawFix {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    course: Option<f64>,
    #[serde(default)]
    horizontal_accuracy: Option<f64>,
    #[serde(default)]
    vertical_accuracy: Option<f64>,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Deserialize, Default)]
struct GpsRecord {
    #[serde(default)]
    raw: Option<RawFix>,
    #[serde(default)]
    no_signal: bool,
}

#[derive(Deserialize)]
struct Record {
    timestamp: f64,
    #[serde(default)]
    dt: Option<f64>,
    #[serde(default)]
    sensors: Sensors,
    #[serde(default)]
    gps: GpsRecord,
}

#[derive(Deserialize)]
struct LogFile {
    records: Vec<Record>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn load_config(args: &Args) -> anyhow::Result<NavigatorConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => NavigatorConfig::from_json(&fs::read_to_string(path)?)?,
        None => NavigatorConfig::default(),
    };
    if let Some(scale) = args.velocity_blend_scale {
        config.fusion.velocity_blend_scale = scale;
    }
    if let Some(threshold) = args.zupt_threshold {
        config.fusion.zupt_accel_threshold = threshold;
    }
    if let Some(timeout) = args.signal_timeout {
        config.signal_timeout_secs = timeout;
    }
    Ok(config)
}

impl Record {
    fn inertial(&self) -> InertialSample {
        InertialSample::new(
            self.sensors.user_acceleration.as_ref().map(|a| Acceleration::new(a.x, a.y, a.z)),
            self.sensors
                .attitude
                .as_ref()
                .map(|a| Attitude::new(a.roll_rad, a.pitch_rad, a.yaw_rad)),
        )
    }

    fn baro(&self) -> Option<BaroSample> {
        self.sensors
            .barometer
            .as_ref()
            .and_then(|b| b.relative_altitude_m)
            .map(|relative_altitude| BaroSample { relative_altitude })
    }

    /// Fix carried by this record, unless the logger flagged the signal as gone.
    fn fix(&self) -> Option<FixSample> {
        if self.gps.no_signal {
            return None;
        }
        let raw = self.gps.raw.as_ref()?;
        let mut fix = FixSample::new(
            raw.timestamp.unwrap_or(self.timestamp),
            raw.latitude,
            raw.longitude,
            raw.horizontal_accuracy.unwrap_or(UNKNOWN),
        );
        fix.speed = raw.speed.unwrap_or(UNKNOWN);
        fix.course = raw.course.unwrap_or(UNKNOWN);
        fix.altitude = raw.altitude;
        fix.vertical_accuracy = raw.vertical_accuracy.unwrap_or(UNKNOWN);
        Some(fix)
    }
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = load_log(path)?;
    if log.records.is_empty() {
        anyhow::bail!("{} has no records", path.display());
    }

    let config = load_config(args)?;
    let mut navigator = Navigator::new(config.clone());

    let mut prev_ts: Option<f64> = None;
    let mut fixes = 0u64;
    let mut dead_reckoning_secs = 0.0;
    let mut altitude_range: Option<(f64, f64)> = None;
    let mut max_speed: f64 = 0.0;
    let mut event_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut transitions = Vec::new();
    let mut display_counts: BTreeMap<&'static str, usize> = BTreeMap::new();

    for record in &log.records {
        // Record-to-record dt; fall back to the logged tick interval
        let dt = match prev_ts {
            Some(prev) if record.timestamp > prev => record.timestamp - prev,
            _ => record.dt.filter(|d| *d > 0.0).unwrap_or(0.1),
        };
        prev_ts = Some(record.timestamp);

        let fix = record.fix();
        if fix.is_some() {
            fixes += 1;
        }

        let out = navigator.tick(&TickInput {
            timestamp: record.timestamp,
            dt,
            inertial: record.inertial(),
            fix,
            baro: record.baro(),
        });

        for event in &out.events {
            *event_counts.entry(event.kind()).or_insert(0) += 1;
            if args.events && !matches!(event, FusionEvent::FixSkipped { .. }) {
                transitions.push(json!({ "timestamp": record.timestamp, "event": event }));
            }
        }
        *display_counts.entry(out.display_source.label()).or_insert(0) += 1;

        if out.dead_reckoning.is_some() {
            dead_reckoning_secs += dt;
        }
        if let Some(alt) = out.altitude {
            altitude_range = Some(match altitude_range {
                Some((lo, hi)) => (lo.min(alt), hi.max(alt)),
                None => (alt, alt),
            });
        }
        if let Some(nav) = out.navigation.as_ref() {
            max_speed = max_speed.max(nav.speed);
        }
    }

    let track = navigator.track();
    let sources: BTreeMap<&'static str, usize> = TrackSource::ALL
        .iter()
        .map(|s| (s.as_str(), track.count(*s)))
        .collect();
    let decimated: Vec<_> = track
        .decimate(args.max_points)
        .iter()
        .map(|e| json!([e.position.latitude, e.position.longitude, e.source]))
        .collect();

    let first_ts = log.records.first().map(|r| r.timestamp).unwrap_or(0.0);
    let last_ts = log.records.last().map(|r| r.timestamp).unwrap_or(first_ts);

    Ok(json!({
        "log": path.display().to_string(),
        "replayed_at": Utc::now().to_rfc3339(),
        "records": log.records.len(),
        "duration_secs": last_ts - first_ts,
        "fixes": fixes,
        "velocity_blend_scale": config.fusion.velocity_blend_scale,
        "zupt_threshold": config.fusion.zupt_accel_threshold,
        "signal_timeout_secs": config.signal_timeout_secs,
        "track_points": track.len(),
        "track_sources": sources,
        "track_length_m": track.length_m(),
        "display_sources": display_counts,
        "max_speed": max_speed,
        "altitude_min": altitude_range.map(|r| r.0),
        "altitude_max": altitude_range.map(|r| r.1),
        "dead_reckoning_secs": dead_reckoning_secs,
        "signal_losses": navigator.monitor().loss_count(),
        "events": event_counts,
        "transitions": transitions,
        "final": navigator.engine().snapshot(),
        "track": decimated,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.dir.as_ref() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("sensor_log_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
