//! retouch: render stroke drafts to masks and run them through a remote
//! inpainting service.
//!
//! A draft is the JSON an editor session saves: the source image path,
//! the committed strokes (in the canvas space of the displayed image)
//! and the chosen model. The strokes only line up with the image when
//! the display size is reproduced, so every command takes the
//! `--container` the image was fitted into while drawing.
//!
//! # Usage
//!
//! ```text
//! retouch mask   <DRAFT> -o mask.png [--overlay preview.png]
//! retouch submit <DRAFT> [--model quality] [--max-dimension 1920]
//! retouch result --process <ID> | --history <ID> | --work <ID> [--download out.png]
//! ```
//!
//! Logging is controlled by `RUST_LOG` (default `info`) and goes to
//! stderr; JSON results go to stdout.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use retouch_editor::descriptor::{fit_within, probe_dimensions};
use retouch_editor::{Dimensions, ImageDescriptor, MaskRasterizer, Size};
use retouch_io::api::format_file_size;
use retouch_io::transport::UploadProgress;
use retouch_io::{
    AbandonHandle, Client, ClientConfig, CompletionPolicy, DeviceInfo, Draft, EditRequest,
    ImageKind, InpaintApi, InpaintModel, ModelPreset, Orchestrator, ProcessJob, ProcessRecord,
    ProgressObserver, RemoteId, Session, Transport, UreqTransport,
};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Mask editing and remote inpainting from the command line.
#[derive(Parser)]
#[command(name = "retouch", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a stroke draft to a binary mask PNG.
    Mask(MaskArgs),
    /// Upload the image and mask, start inpainting and wait for the result.
    Submit(SubmitArgs),
    /// Fetch a processing record.
    Result(ResultArgs),
}

/// Draft input shared by `mask` and `submit`.
#[derive(Args)]
struct DraftArgs {
    /// Stroke draft (JSON).
    draft: PathBuf,

    /// Source image. Defaults to the draft's `source_path`, resolved
    /// relative to the draft file.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Size of the area the image was fitted into while drawing.
    #[arg(long, value_name = "WxH", default_value = "600x600", value_parser = parse_container)]
    container: Size,
}

#[derive(Args)]
struct MaskArgs {
    #[command(flatten)]
    input: DraftArgs,

    /// Output mask path.
    #[arg(short, long)]
    output: PathBuf,

    /// Also write the translucent red preview of the strokes.
    #[arg(long, value_name = "PATH")]
    overlay: Option<PathBuf>,
}

/// Server connection settings.
#[derive(Args)]
struct ServerArgs {
    /// Server root URL.
    #[arg(long, env = "RETOUCH_SERVER", default_value = ClientConfig::DEFAULT_BASE_URL)]
    server: String,

    /// Bearer token for authenticated endpoints.
    #[arg(long, env = "RETOUCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Full client configuration as JSON. Overrides `--server`.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Args)]
struct SubmitArgs {
    #[command(flatten)]
    input: DraftArgs,

    #[command(flatten)]
    server: ServerArgs,

    /// Inpainting model. Defaults to the model saved in the draft.
    #[arg(long, value_enum)]
    model: Option<ModelArg>,

    /// Downscale the original so neither side exceeds this many pixels
    /// before uploading.
    #[arg(long, value_name = "PX", value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_dimension: Option<u32>,

    /// Seconds between status polls.
    #[arg(long, default_value_t = CompletionPolicy::DEFAULT_POLL_INTERVAL.as_secs_f64())]
    poll_interval: f64,

    /// Polls before giving up.
    #[arg(long, default_value_t = CompletionPolicy::DEFAULT_MAX_POLLS)]
    max_polls: u32,

    /// Return as soon as the job is accepted.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Args)]
struct ResultArgs {
    #[command(flatten)]
    server: ServerArgs,

    #[command(flatten)]
    id: RecordId,

    /// Also save the repaired image to this path.
    #[arg(long, value_name = "PATH")]
    download: Option<PathBuf>,
}

/// Which record to fetch. Exactly one is required.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct RecordId {
    /// Processing job id.
    #[arg(long, value_name = "ID")]
    process: Option<String>,

    /// History record id.
    #[arg(long, value_name = "ID")]
    history: Option<String>,

    /// Saved work id.
    #[arg(long, value_name = "ID")]
    work: Option<String>,
}

/// Model selection: a concrete model or a quality preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    /// LaMa.
    Lama,
    /// Latent diffusion.
    Ldm,
    /// Mask-aware transformer.
    Mat,
    /// Fastest model.
    Fast,
    /// Best-quality model.
    Quality,
}

impl From<ModelArg> for InpaintModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Lama => Self::Lama,
            ModelArg::Ldm => Self::Ldm,
            ModelArg::Mat => Self::Mat,
            ModelArg::Fast => ModelPreset::Fast.into(),
            ModelArg::Quality => ModelPreset::Quality.into(),
        }
    }
}

/// Parse `"WxH"` into a positive container size.
fn parse_container(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("container must be 'WxH', got: '{s}'"))?;
    let parse = |v: &str| -> Result<f64, String> {
        let value: f64 = v
            .trim()
            .parse()
            .map_err(|e| format!("invalid container side '{v}': {e}"))?;
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(format!("container sides must be positive, got {value}"))
        }
    };
    Ok(Size::new(parse(w)?, parse(h)?))
}

/// Relative draft sources are relative to the draft file.
fn resolve_source(draft_path: &Path, source: &Path) -> PathBuf {
    if source.is_absolute() {
        return source.to_path_buf();
    }
    draft_path
        .parent()
        .map_or_else(|| source.to_path_buf(), |dir| dir.join(source))
}

// ---------------------------------------------------------------------------
// Draft loading
// ---------------------------------------------------------------------------

struct LoadedDraft {
    draft: Draft,
    image_bytes: Vec<u8>,
    descriptor: ImageDescriptor,
}

fn load_draft(args: &DraftArgs) -> CliResult<LoadedDraft> {
    let json = std::fs::read_to_string(&args.draft)?;
    let draft = Draft::from_json(&json)?;
    let image_path = args
        .image
        .clone()
        .unwrap_or_else(|| resolve_source(&args.draft, &draft.source_path));
    let image_bytes = std::fs::read(&image_path)?;
    let natural = probe_dimensions(&image_bytes)?;
    let descriptor = ImageDescriptor::contain(image_path, natural, args.container)?;
    tracing::info!(
        image = %descriptor.source_path().display(),
        strokes = draft.strokes.len(),
        width = descriptor.display().width,
        height = descriptor.display().height,
        "loaded draft"
    );
    Ok(LoadedDraft {
        draft,
        image_bytes,
        descriptor,
    })
}

/// Re-encode `bytes` so neither side exceeds `max`. Images that already
/// fit are returned as they are.
fn downscale(bytes: Vec<u8>, path: &Path, natural: Dimensions, max: u32) -> CliResult<Vec<u8>> {
    let target = fit_within(natural, Dimensions::new(max, max));
    if target == natural {
        return Ok(bytes);
    }
    let format = ImageFormat::from_path(path)?;
    let resized = image::load_from_memory(&bytes)?.resize_exact(
        target.width,
        target.height,
        FilterType::Triangle,
    );
    let resized = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(resized.to_rgb8())
    } else {
        resized
    };
    let mut out = Vec::new();
    resized.write_to(&mut Cursor::new(&mut out), format)?;
    tracing::info!(
        width = target.width,
        height = target.height,
        bytes = out.len(),
        "downscaled original"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Server access
// ---------------------------------------------------------------------------

fn client_config(args: &ServerArgs) -> CliResult<ClientConfig> {
    if let Some(json) = &args.config_json {
        return serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}").into());
    }
    Ok(ClientConfig::with_base_url(args.server.clone()))
}

fn connect(args: &ServerArgs) -> CliResult<InpaintApi<UreqTransport>> {
    let config = client_config(args)?;
    let session = Session::new();
    if let Some(token) = &args.token {
        session.sign_in(token.clone());
    }
    session.set_device(DeviceInfo::current());
    tracing::debug!(base_url = %config.base_url, authenticated = session.is_authenticated(), "client ready");
    Ok(InpaintApi::new(Client::new(
        UreqTransport::new(),
        config,
        Rc::new(session),
    )))
}

/// Prints job progress to stderr.
struct StderrObserver;

impl ProgressObserver for StderrObserver {
    fn on_transition(&mut self, job: &ProcessJob) {
        eprintln!("[{:>3}%] {}", job.progress, job.message());
    }

    fn on_upload_progress(&mut self, kind: ImageKind, progress: UploadProgress) {
        tracing::trace!(kind = kind.as_str(), percent = progress.percent(), "upload progress");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_mask(args: &MaskArgs) -> CliResult<()> {
    let loaded = load_draft(&args.input)?;
    let mut raster = MaskRasterizer::new(loaded.descriptor.display())?;
    raster.render(&loaded.draft.strokes);
    if raster.is_blank() {
        tracing::warn!("mask is empty; nothing is marked for repair");
    }

    std::fs::write(&args.output, raster.export_png()?)?;
    eprintln!(
        "Wrote {} ({} marked pixels)",
        args.output.display(),
        raster.coverage()
    );

    if let Some(path) = &args.overlay {
        raster.overlay_image().save(path)?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

fn run_submit(args: &SubmitArgs) -> CliResult<()> {
    let loaded = load_draft(&args.input)?;
    let image_bytes = match args.max_dimension {
        Some(max) => downscale(
            loaded.image_bytes,
            loaded.descriptor.source_path(),
            loaded.descriptor.natural(),
            max,
        )?,
        None => loaded.image_bytes,
    };

    let completion = if args.no_wait {
        CompletionPolicy::submit_only()
    } else {
        CompletionPolicy {
            poll_interval: Duration::try_from_secs_f64(args.poll_interval)?,
            max_polls: args.max_polls,
        }
    };
    let model = args.model.map_or(loaded.draft.model, InpaintModel::from);

    let mut orchestrator = Orchestrator::new(connect(&args.server)?, completion);
    let request = EditRequest {
        descriptor: &loaded.descriptor,
        image_bytes: &image_bytes,
        strokes: &loaded.draft.strokes,
        model,
    };

    match orchestrator.run(&request, &mut StderrObserver, &AbandonHandle::new()) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!(kind = ?err.kind(), retryable = err.can_retry(), "{err}");
            Err(err.user_message().into())
        }
    }
}

/// Fetch the selected record and, when asked, save its result image.
fn retrieve<T: Transport>(
    api: &InpaintApi<T>,
    id: &RecordId,
    download: Option<&Path>,
) -> CliResult<ProcessRecord> {
    let record = match (&id.process, &id.history, &id.work) {
        (Some(id), _, _) => api.fetch_process(&RemoteId::new(id.as_str()))?,
        (None, Some(id), _) => api.fetch_history(&RemoteId::new(id.as_str()))?,
        (None, None, Some(id)) => api.fetch_work(&RemoteId::new(id.as_str()))?,
        (None, None, None) => return Err("one of --process, --history or --work is required".into()),
    };

    if let Some(path) = download {
        let bytes = api
            .download_result(&record)?
            .ok_or("the record has no result image yet")?;
        std::fs::write(path, &bytes)?;
        eprintln!("Saved {} ({})", path.display(), format_file_size(bytes.len() as u64));
    }
    Ok(record)
}

fn run_result(args: &ResultArgs) -> CliResult<()> {
    let api = connect(&args.server)?;
    let record = retrieve(&api, &args.id, args.download.as_deref())?;

    eprintln!(
        "{:?} | model {} | {} | {}",
        record.status,
        record.model_label().as_deref().unwrap_or("-"),
        record.format_label(),
        record.formatted_file_size().as_deref().unwrap_or("-"),
    );
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    match &cli.command {
        Command::Mask(args) => run_mask(args),
        Command::Submit(args) => run_submit(args),
        Command::Result(args) => run_result(args),
    }
}
