use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use inkpdf_core::{
    ApproxTextMeasure, Collaborators, DisplayList, Editor, EditorCommand, EditorConfig,
    FileRecordStore, RecordStore,
};
use inkpdf_render::{encode_data_url, DataUrlDecoder, PdfiumEngine, RasterSurface};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "inkpdf", version, about = "Annotate PDF documents with a saved overlay")]
struct Args {
    /// Config file; defaults to the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Open a PDF and save it as a record, keeping any overlay already saved under its name
    Import { file: PathBuf },
    /// Apply a JSON array of editor commands to a saved record
    Apply {
        name: String,
        script: PathBuf,
        /// Save the record after the last command
        #[arg(long)]
        save: bool,
    },
    /// Print the view state and annotation counts of a saved record
    Show {
        name: String,
        /// Dump the full annotation list as JSON
        #[arg(long)]
        annotations: bool,
    },
    /// List saved records, newest first
    List,
    /// Load the most recently saved record
    Resume,
    /// Rasterize one page with its annotations to a PNG
    Snapshot {
        name: String,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(short, long)]
        out: PathBuf,
        /// Also write the recorded draw calls as JSON
        #[arg(long)]
        display_list: Option<PathBuf>,
    },
    /// Print an image file as a data URL for use in scripts
    DataUrl { file: PathBuf },
}

#[derive(Debug, Serialize)]
struct Summary {
    file_name: String,
    page_count: u32,
    current_page: u32,
    zoom: f32,
    annotations: usize,
    by_kind: BTreeMap<&'static str, usize>,
}

fn summarize(editor: &Editor) -> Summary {
    let mut by_kind = BTreeMap::new();
    for annotation in editor.annotations().iter() {
        *by_kind.entry(annotation.kind().name()).or_insert(0) += 1;
    }
    Summary {
        file_name: editor.file_name().unwrap_or_default().to_owned(),
        page_count: editor.page_count(),
        current_page: editor.current_page(),
        zoom: editor.zoom(),
        annotations: editor.annotations().len(),
        by_kind,
    }
}

fn read_script(path: &Path) -> Result<Vec<EditorCommand>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read script {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to decode script {:?}", path))
}

fn print_events(editor: &Editor) -> Result<()> {
    for event in editor.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("{:?} has no file name", path))
}

fn image_data_url(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read image {:?}", path))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("unrecognized image format in {:?}", path))?;
    Ok(encode_data_url(format.to_mime_type(), &bytes))
}

fn build_editor(config: EditorConfig, records: Arc<dyn RecordStore>) -> Result<Editor> {
    let engine = Arc::new(PdfiumEngine::new()?);
    let collab = Collaborators {
        renderer: engine.clone(),
        editor: engine,
        records,
        images: Arc::new(DataUrlDecoder),
        measure: Arc::new(ApproxTextMeasure::default()),
    };
    Ok(Editor::new(config, collab))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "inkpdf", "inkpdf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| EditorConfig::default_path(&project_dirs));
    let config = EditorConfig::load(&config_path)?;
    let records_dir = project_dirs.data_local_dir().join("records");
    let records: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(records_dir)?);

    match args.command {
        Cmd::DataUrl { file } => {
            println!("{}", image_data_url(&file)?);
        }
        Cmd::List => {
            let mut all = records.get_all()?;
            all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            for record in all {
                println!(
                    "{}\t{}\tpage {}\t{} annotations",
                    record.timestamp,
                    record.file_name,
                    record.current_page,
                    record.annotations.len()
                );
            }
        }
        Cmd::Import { file } => {
            let bytes = fs::read(&file).with_context(|| format!("failed to read {:?}", file))?;
            let name = file_name_of(&file)?;
            let mut editor = build_editor(config, records)?;
            editor.open(&name, bytes).await?;
            editor.save().await?;
            print_events(&editor)?;
            println!("{}", serde_json::to_string_pretty(&summarize(&editor))?);
        }
        Cmd::Apply { name, script, save } => {
            let commands = read_script(&script)?;
            let mut editor = build_editor(config, records)?;
            editor.load_by_name(&name).await?;
            editor.drain_events();
            for (index, command) in commands.into_iter().enumerate() {
                if let Err(err) = editor.apply(command).await {
                    warn!(index, %err, "command failed");
                }
                print_events(&editor)?;
            }
            if save {
                editor.save().await?;
                print_events(&editor)?;
            }
            println!("{}", serde_json::to_string_pretty(&summarize(&editor))?);
        }
        Cmd::Show { name, annotations } => {
            let record = records
                .get(&name)?
                .ok_or_else(|| anyhow!("no saved record named {:?}", name))?;
            if annotations {
                println!("{}", serde_json::to_string_pretty(&record.annotations)?);
            } else {
                let mut editor = build_editor(config, records)?;
                editor.load_by_name(&name).await?;
                println!("{}", serde_json::to_string_pretty(&summarize(&editor))?);
            }
        }
        Cmd::Resume => {
            let mut editor = build_editor(config, records)?;
            if editor.resume_most_recent().await? {
                println!("{}", serde_json::to_string_pretty(&summarize(&editor))?);
            } else {
                println!("no saved records");
            }
        }
        Cmd::Snapshot {
            name,
            page,
            out,
            display_list,
        } => {
            let mut editor = build_editor(config, records)?;
            editor.load_by_name(&name).await?;

            // The first pass queues image decodes; the second paints them.
            let mut layers = [(page, DisplayList::new())];
            editor.render(&mut layers);
            editor.pump_image_decodes().await;
            editor.render(&mut layers);
            if let Some(path) = display_list {
                fs::write(&path, serde_json::to_string_pretty(&layers[0].1)?)
                    .with_context(|| format!("failed to write {:?}", path))?;
            }

            let base = editor.render_document_page(page)?;
            let surface = RasterSurface::new(base)
                .ok_or_else(|| anyhow!("page {} rendered to a malformed bitmap", page))?;
            let mut layers = [(page, surface)];
            editor.render(&mut layers);
            let [(_, surface)] = layers;
            surface
                .into_image()
                .save(&out)
                .with_context(|| format!("failed to write {:?}", out))?;
            info!(page, out = %out.display(), "snapshot written");
        }
    }

    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "inkpdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
