use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use landsatpro::api::{PipelineRun, RunReport, Services, Workspace, load_params, run_with_comparative};
use landsatpro::core::params::{DateRange, GridCell, PipelineParams};
use landsatpro::core::processing::IndexOutcome;
use landsatpro::core::progress::{CancelToken, ProgressEvent};
use landsatpro::io::{Credentials, Session, SessionConfig};

use super::args::CliArgs;
use super::errors::AppError;

/// Preset (or defaults) with command-line overrides applied
pub fn build_params(args: &CliArgs) -> Result<PipelineParams, AppError> {
    let mut params = match &args.params {
        Some(path) => load_params(path)?,
        None => PipelineParams::default(),
    };

    if let Some(start) = args.start {
        params.date_range.start = start;
    }
    if let Some(end) = args.end {
        params.date_range.end = end;
    }
    if let (Some(start), Some(end)) = (args.compare_start, args.compare_end) {
        params.comparative = Some(DateRange::new(start, end));
    }
    if let Some(cloud) = args.max_cloud {
        params.max_cloud_cover = cloud;
    }
    if !args.platforms.is_empty() {
        params.platforms = args.platforms.clone();
    }
    if !args.indices.is_empty() {
        params.indices = args.indices.clone();
    }
    if let (Some(path), Some(row)) = (args.path, args.row) {
        params.grid = Some(GridCell { path, row });
    }
    if let Some(aoi) = &args.aoi {
        params.aoi_path = Some(aoi.clone());
    }
    if let Some(fraction) = args.min_coverage {
        params.min_coverage = fraction;
    }
    if let Some(days) = args.window_days {
        params.window_days = days;
    }
    if let Some(policy) = args.window_policy {
        params.window_policy = policy;
    }
    if let Some(nodata) = args.nodata {
        params.nodata = nodata;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(AppError::InvalidArgument {
                arg: "--workers".into(),
                reason: "must be greater than 0".into(),
            });
        }
        params.workers = workers;
    }
    if let Some(url) = &args.catalog_url {
        params.catalog_url = url.clone();
    }
    params.reuse_downloads |= args.reuse_downloads;

    params.validate().map_err(|reason| AppError::InvalidArgument {
        arg: "parameters".into(),
        reason,
    })?;
    Ok(params)
}

fn open_session(args: &CliArgs, params: &PipelineParams) -> Result<Session, AppError> {
    let config = SessionConfig::from(params);
    let session = match (&args.username, &args.password) {
        (Some(username), Some(password)) => Session::login(
            config,
            &Credentials {
                username: username.clone(),
                password: password.clone(),
            },
        )?,
        (Some(_), None) => {
            return Err(AppError::MissingArgument {
                arg: "--password".into(),
            });
        }
        _ => {
            warn!("No provider credentials; protected downloads will fail");
            Session::anonymous(config)?
        }
    };
    Ok(session)
}

fn print_progress(event: ProgressEvent) {
    let band = event.band.map(|b| format!(" {}", b)).unwrap_or_default();
    match event.percent {
        Some(p) => println!("[{:?}{}] {} ({:.0}%)", event.stage, band, event.message, p),
        None => println!("[{:?}{}] {}", event.stage, band, event.message),
    }
}

fn print_summary(label: &str, report: &RunReport) {
    println!("== {} ==", label);
    if let Some(source) = &report.aoi_source {
        println!("AOI: {}", source.display());
    }
    println!(
        "Scenes: {} selected of {} candidates",
        report.selection.scenes.len(),
        report.candidates
    );
    for (band, path) in &report.log.clips {
        println!("Clip {}: {}", band, path.display());
    }
    for (group, bands) in &report.log.missing_bands {
        println!("Missing in {}: {:?}", group, bands);
    }
    for (band, reason) in &report.log.failed_bands {
        println!("Band {} failed: {}", band, reason);
    }
    for (index, outcome) in &report.indices.outcomes {
        match outcome {
            IndexOutcome::Computed(export) => match export.stats {
                Some(s) => println!(
                    "{}: min={:.4} max={:.4} mean={:.4} std={:.4} -> {}",
                    index,
                    s.min,
                    s.max,
                    s.mean,
                    s.std,
                    export.raster_path.display()
                ),
                None => println!("{}: no valid pixels -> {}", index, export.raster_path.display()),
            },
            IndexOutcome::Unavailable { missing } => {
                println!("{}: unavailable, missing bands {:?}", index, missing)
            }
            IndexOutcome::Failed { reason } => println!("{}: failed, {}", index, reason),
        }
    }
    if report.is_partial() {
        println!("Completed with gaps (see exports/processing_log.json)");
    }
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    let params = build_params(&args)?;
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("Cancelling after the current transfer...");
            cancel.cancel();
        })
        .map_err(AppError::from)?;
    }

    let session = open_session(&args, &params)?;
    let workspace = Workspace::new(&args.workspace);
    info!("Workspace: {:?}", workspace.root());

    let progress = print_progress;
    let run = PipelineRun::new(workspace, params, Services::from_session(&session))
        .with_progress(&progress)
        .with_cancel(cancel);
    let (primary, comparative) = run_with_comparative(&run).map_err(AppError::from)?;

    print_summary("Main period", &primary);
    if let Some(report) = &comparative {
        print_summary("Comparative period", report);
    }
    Ok(())
}
