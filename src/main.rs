use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, info, warn};

use radar_distance::logging::{init_logging, Verbosity};
use radar_distance::persistence::{load_context_from_path, load_detector_config_from_path, save_context_to_path};
use radar_distance::version::VERSION;
use radar_distance::{
    DetailedStatus, Detector, DetectorConfig, FileRecorder, PeakSortingMethod, Profile, Recorder, Reflector,
    SimulatedClient, SimulatedClientConfig, ThresholdMethod,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThresholdArg {
    Cfar,
    Fixed,
    Recorded,
}

impl From<ThresholdArg> for ThresholdMethod {
    fn from(t: ThresholdArg) -> Self {
        match t {
            ThresholdArg::Cfar => ThresholdMethod::Cfar,
            ThresholdArg::Fixed => ThresholdMethod::Fixed,
            ThresholdArg::Recorded => ThresholdMethod::Recorded,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Closest,
    Strongest,
}

impl From<SortArg> for PeakSortingMethod {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Closest => PeakSortingMethod::Closest,
            SortArg::Strongest => PeakSortingMethod::Strongest,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "radar-distance")]
#[command(version = VERSION)]
#[command(about = "Run the radar distance detector against a simulated sensor")]
struct Cli {
    /// Detector config file (YAML, or JSON with a .json extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start of the measured range in metres
    #[arg(long)]
    start: Option<f64>,

    /// End of the measured range in metres
    #[arg(long)]
    end: Option<f64>,

    /// Longest profile to use (1-5)
    #[arg(long, value_parser = parse_profile)]
    max_profile: Option<Profile>,

    #[arg(long)]
    max_step_length: Option<u32>,

    #[arg(long, value_enum)]
    threshold_method: Option<ThresholdArg>,

    #[arg(long, value_enum)]
    sort: Option<SortArg>,

    #[arg(long)]
    threshold_sensitivity: Option<f64>,

    #[arg(long)]
    fixed_threshold: Option<f64>,

    #[arg(long)]
    signal_quality: Option<f64>,

    /// Simulated reflector as DISTANCE_M:AMPLITUDE; repeat for several
    #[arg(long = "reflector", value_parser = parse_reflector)]
    reflectors: Vec<Reflector>,

    /// Simulated noise standard deviation at HWAAS 1
    #[arg(long)]
    noise: Option<f64>,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 1)]
    sensor_id: u32,

    /// Number of frames to measure
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: u64,

    /// Calibration context to start from
    #[arg(long)]
    load_context: Option<PathBuf>,

    /// Where to store the calibration context after the run
    #[arg(long)]
    save_context: Option<PathBuf>,

    /// Directory to record algo data and results into
    #[arg(long)]
    record: Option<PathBuf>,

    /// Verbose logging; repeat (-vv) for debug output
    #[arg(short, long, action = ArgAction::Count, conflicts_with_all = ["debug", "quiet"])]
    verbose: u8,

    /// Debug logging
    #[arg(long, conflicts_with = "quiet")]
    debug: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else {
            Verbosity::from_flags(self.verbose, self.quiet)
        }
    }

    fn detector_config(&self) -> radar_distance::Result<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => load_detector_config_from_path(path)?,
            None => DetectorConfig::default(),
        };
        if let Some(v) = self.start {
            config.start_m = v;
        }
        if let Some(v) = self.end {
            config.end_m = v;
        }
        if let Some(v) = self.max_profile {
            config.max_profile = v;
        }
        if self.max_step_length.is_some() {
            config.max_step_length = self.max_step_length;
        }
        if let Some(v) = self.threshold_method {
            config.threshold_method = v.into();
        }
        if let Some(v) = self.sort {
            config.peaksorting_method = v.into();
        }
        if let Some(v) = self.threshold_sensitivity {
            config.threshold_sensitivity = v;
        }
        if let Some(v) = self.fixed_threshold {
            config.fixed_threshold_value = v;
        }
        if let Some(v) = self.signal_quality {
            config.signal_quality = v;
        }
        config.validate()?;
        Ok(config)
    }

    fn client_config(&self) -> SimulatedClientConfig {
        let mut config = SimulatedClientConfig {
            seed: self.seed,
            ..SimulatedClientConfig::default()
        };
        if !self.reflectors.is_empty() {
            config.reflectors = self.reflectors.clone();
        }
        if let Some(noise) = self.noise {
            config.noise_std = noise;
        }
        config
    }
}

fn parse_profile(s: &str) -> Result<Profile, String> {
    s.parse::<Profile>().map_err(|e| e.to_string())
}

fn parse_reflector(s: &str) -> Result<Reflector, String> {
    let (distance, amplitude) = s
        .split_once(':')
        .ok_or_else(|| format!("expected DISTANCE_M:AMPLITUDE, got '{s}'"))?;
    let distance_m = distance.trim().parse::<f64>().map_err(|e| format!("distance: {e}"))?;
    let amplitude = amplitude.trim().parse::<f64>().map_err(|e| format!("amplitude: {e}"))?;
    Ok(Reflector::new(distance_m, amplitude))
}

fn run(cli: &Cli) -> radar_distance::Result<()> {
    let config = cli.detector_config()?;
    let context = cli.load_context.as_deref().map(load_context_from_path).transpose()?;
    let client = SimulatedClient::new(cli.client_config());

    let mut detector = Detector::new(client, cli.sensor_id, config, context)?;
    info!(session = ?detector.session_config(), "planned session");

    let status = detector.status()?;
    if status.ready_to_calibrate_close_range
        && matches!(
            status.detector_state,
            DetailedStatus::CloseRangeCalibrationMissing | DetailedStatus::CloseRangeCalibrationConfigMismatch
        )
    {
        detector.calibrate_close_range()?;
    }
    let status = detector.status()?;
    if status.ready_to_record_threshold && status.detector_state != DetailedStatus::Ok {
        detector.record_threshold()?;
    }
    let status = detector.status()?;
    if !status.ready_to_start {
        warn!(state = ?status.detector_state, "detector not ready after calibration");
    }

    let recorder = match &cli.record {
        Some(dir) => Some(Box::new(FileRecorder::new(dir)?) as Box<dyn Recorder>),
        None => None,
    };
    detector.start(recorder)?;
    for frame in 0..cli.frames {
        let result = detector.get_next()?;
        let distances: Vec<String> = result
            .distances
            .iter()
            .zip(&result.strengths)
            .map(|(d, s)| format!("{d:.3} m ({s:.0})"))
            .collect();
        println!("frame {frame}: {}", distances.join(", "));
    }
    detector.stop()?;

    if let Some(path) = &cli.save_context {
        save_context_to_path(detector.context(), path)?;
        info!(path = %path.display(), "context saved");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbosity()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
