use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use motion_fusion_rs::geo::{displacement_to_degrees, haversine_distance};
use motion_fusion_rs::{
    Acceleration, Attitude, FixSample, GeoPoint, InertialSample, NavigationSnapshot, Navigator,
    NavigatorConfig, TickInput, TrackSource,
};

#[derive(Parser, Debug)]
#[command(name = "motion_fusion")]
#[command(about = "GPS/INS fusion on a synthetic straight drive with a satellite outage", long_about = None)]
struct Args {
    /// Duration in seconds
    #[arg(value_name = "SECONDS", default_value = "120")]
    duration: u64,

    /// Ground speed (m/s)
    #[arg(long, default_value = "8.0")]
    speed: f64,

    /// Course over ground (degrees from north)
    #[arg(long, default_value = "45.0")]
    course: f64,

    #[arg(long, default_value = "35.681236")]
    start_lat: f64,

    #[arg(long, default_value = "139.767125")]
    start_lon: f64,

    /// Tick interval (s)
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Seconds between fixes
    #[arg(long, default_value = "1.0")]
    fix_interval: f64,

    /// Horizontal accuracy of normal fixes (m)
    #[arg(long, default_value = "5.0")]
    fix_accuracy: f64,

    /// Outage start (s)
    #[arg(long, default_value = "40.0")]
    outage_start: f64,

    /// Outage length (s)
    #[arg(long, default_value = "20.0")]
    outage_len: f64,

    /// Keep fixes coming during the outage at this accuracy instead of dropping them
    #[arg(long)]
    degraded_accuracy: Option<f64>,

    /// JSON file with navigator settings (partial files are fine)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between status lines
    #[arg(long, default_value = "10")]
    status_every: u64,

    /// Print a JSON summary instead of status lines
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    duration_secs: f64,
    ticks: u64,
    fixes: u64,
    track_points: usize,
    track_sources: BTreeMap<&'static str, usize>,
    track_length_m: f64,
    true_distance_m: f64,
    max_error_m: f64,
    outage_max_error_m: f64,
    final_error_m: f64,
    dead_reckoning_max_error_m: Option<f64>,
    events: BTreeMap<&'static str, usize>,
    final_snapshot: Option<NavigationSnapshot>,
}

/// Synthetic vehicle on a straight line with a deterministic fix wobble.
struct Drive {
    start: GeoPoint,
    speed: f64,
    course_rad: f64,
}

impl Drive {
    fn truth(&self, t: f64) -> GeoPoint {
        let distance = self.speed * t;
        let (d_lat, d_lon) = displacement_to_degrees(
            self.start.latitude,
            distance * self.course_rad.cos(),
            distance * self.course_rad.sin(),
        );
        GeoPoint {
            latitude: self.start.latitude + d_lat,
            longitude: self.start.longitude + d_lon,
        }
    }

    fn fix(&self, t: f64, accuracy: f64) -> FixSample {
        let truth = self.truth(t);
        let wobble = 0.3 * accuracy;
        let (d_lat, d_lon) = displacement_to_degrees(
            truth.latitude,
            wobble * (1.7 * t).sin(),
            wobble * (2.3 * t).cos(),
        );
        FixSample::new(t, truth.latitude + d_lat, truth.longitude + d_lon, accuracy)
            .with_motion(self.speed, self.course_rad.to_degrees().rem_euclid(360.0))
    }

    /// Road vibration only; the vehicle holds its speed.
    fn inertial(&self, t: f64) -> InertialSample {
        InertialSample::new(
            Some(Acceleration::new(
                0.01 * (13.0 * t).sin(),
                0.01 * (11.0 * t).cos(),
                0.02 * (7.0 * t).sin(),
            )),
            Some(Attitude::new(0.0, 0.0, 1.5 * PI - self.course_rad)),
        )
    }
}

fn load_config(path: Option<&Path>) -> Result<NavigatorConfig> {
    match path {
        Some(p) => Ok(NavigatorConfig::from_json(&fs::read_to_string(p)?)?),
        None => Ok(NavigatorConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(args.dt.is_finite() && args.dt > 0.0 && args.fix_interval.is_finite() && args.fix_interval > 0.0) {
        anyhow::bail!("--dt and --fix-interval must be positive");
    }

    let config = load_config(args.config.as_deref())?;
    let mut navigator = Navigator::new(config);

    let drive = Drive {
        start: GeoPoint::new(args.start_lat, args.start_lon)?,
        speed: args.speed,
        course_rad: args.course.to_radians(),
    };

    let outage = args.outage_start..args.outage_start + args.outage_len;
    let ticks = (args.duration as f64 / args.dt).round() as u64;
    let fix_every = ((args.fix_interval / args.dt).round() as u64).max(1);
    let status_every = ((args.status_every as f64 / args.dt).round() as u64).max(1);

    if !args.json {
        println!("[{}] Motion Fusion simulation starting", ts_now());
        println!("  Duration: {} s, dt {:.3} s", args.duration, args.dt);
        println!("  Drive: {:.1} m/s @ {:.0}°", args.speed, args.course);
        println!(
            "  Outage: {:.0}-{:.0} s ({})",
            outage.start,
            outage.end,
            match args.degraded_accuracy {
                Some(acc) => format!("degraded fixes, {:.0} m", acc),
                None => "no fixes".to_string(),
            }
        );
    }

    let mut fixes = 0u64;
    let mut max_error: f64 = 0.0;
    let mut outage_max_error: f64 = 0.0;
    let mut final_error = 0.0;
    let mut dr_max_error: Option<f64> = None;
    let mut events: BTreeMap<&'static str, usize> = BTreeMap::new();

    for k in 0..=ticks {
        let t = k as f64 * args.dt;
        let fix = if k % fix_every == 0 {
            match (outage.contains(&t), args.degraded_accuracy) {
                (false, _) => Some(drive.fix(t, args.fix_accuracy)),
                (true, Some(acc)) => Some(drive.fix(t, acc)),
                (true, None) => None,
            }
        } else {
            None
        };
        if fix.is_some() {
            fixes += 1;
        }

        let out = navigator.tick(&TickInput {
            timestamp: t,
            dt: args.dt,
            inertial: drive.inertial(t),
            fix,
            baro: None,
        });

        for event in &out.events {
            *events.entry(event.kind()).or_insert(0) += 1;
        }

        let truth = drive.truth(t);
        if let Some(nav) = out.navigation.as_ref() {
            let error = haversine_distance(GeoPoint { latitude: nav.latitude, longitude: nav.longitude }, truth);
            max_error = max_error.max(error);
            if outage.contains(&t) {
                outage_max_error = outage_max_error.max(error);
            }
            final_error = error;

            if !args.json && k % status_every == 0 {
                println!(
                    "[{}] t={:6.1}s mode={:<13} src={:<13} speed={:5.2} m/s err={:6.1} m  {}",
                    ts_now(),
                    t,
                    nav.mode,
                    out.display_source.label(),
                    nav.speed,
                    error,
                    navigator.monitor().format_status(t)
                );
            }
        }
        if let Some(dr) = out.dead_reckoning.as_ref() {
            let error = haversine_distance(dr.position, truth);
            dr_max_error = Some(dr_max_error.map_or(error, |m| m.max(error)));
        }
    }

    let track = navigator.track();
    let track_sources = TrackSource::ALL
        .iter()
        .map(|s| (s.as_str(), track.count(*s)))
        .collect();

    let summary = Summary {
        duration_secs: ticks as f64 * args.dt,
        ticks: navigator.ticks(),
        fixes,
        track_points: track.len(),
        track_sources,
        track_length_m: track.length_m(),
        true_distance_m: args.speed * ticks as f64 * args.dt,
        max_error_m: max_error,
        outage_max_error_m: outage_max_error,
        final_error_m: final_error,
        dead_reckoning_max_error_m: dr_max_error,
        events,
        final_snapshot: navigator.engine().snapshot(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("[{}] Done: {} ticks, {} fixes", ts_now(), summary.ticks, summary.fixes);
        println!(
            "  Error: max {:.1} m, outage max {:.1} m, final {:.1} m",
            summary.max_error_m, summary.outage_max_error_m, summary.final_error_m
        );
        if let Some(dr) = summary.dead_reckoning_max_error_m {
            println!("  Dead reckoning max error: {:.1} m", dr);
        }
        println!(
            "  Track: {} points, {:.0} m (true {:.0} m)",
            summary.track_points, summary.track_length_m, summary.true_distance_m
        );
        for (source, count) in &summary.track_sources {
            println!("    {:<7} {}", source, count);
        }
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
